use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, Date32Array, Date32Builder},
    compute::cast,
    datatypes::DataType,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::sync::Arc;

const UNIX_EPOCH_DAY: i32 = 719_163;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

fn date_to_days(d: NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAY
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAY)?)
}

/// First day of the month containing `d`.
pub fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Parse a text date in any of the accepted layouts.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // bare "YYYY-MM"; `get` keeps multibyte text from splitting mid-char
    if s.len() == 7 && s.get(4..5) == Some("-") {
        let year: i32 = s.get(0..4)?.parse().ok()?;
        let month: u32 = s.get(5..7)?.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }
    None
}

fn truncate_days(arr: &Date32Array) -> Date32Array {
    arr.iter()
        .map(|v| v.and_then(days_to_date).map(|d| date_to_days(first_of_month(d))))
        .collect()
}

/// Truncate a date-like column to the first day of its month as `Date32`.
///
/// Returns the new column and the number of non-null text cells that could not
/// be parsed (those become null).
pub fn truncate_to_month(col: &ArrayRef) -> Result<(ArrayRef, usize)> {
    match col.data_type() {
        DataType::Date32 => {
            let out = truncate_days(col.as_primitive());
            Ok((Arc::new(out), 0))
        }
        DataType::Date64 | DataType::Timestamp(_, _) => {
            let days = cast(col, &DataType::Date32)
                .with_context(|| format!("casting {} to Date32", col.data_type()))?;
            let out = truncate_days(days.as_primitive());
            Ok((Arc::new(out), 0))
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text = cast(col, &DataType::Utf8)?;
            let text = text.as_string::<i32>();
            let mut b = Date32Builder::with_capacity(text.len());
            let mut unparsed = 0;
            for v in text.iter() {
                match v {
                    Some(s) if s.trim().is_empty() => b.append_null(),
                    Some(s) => match parse_date(s) {
                        Some(d) => b.append_value(date_to_days(first_of_month(d))),
                        None => {
                            unparsed += 1;
                            b.append_null();
                        }
                    },
                    None => b.append_null(),
                }
            }
            Ok((Arc::new(b.finish()), unparsed))
        }
        other => Err(anyhow!("cannot truncate a {} column to month", other)),
    }
}
