use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, AsArray, StringBuilder},
    compute::cast,
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use super::month::truncate_to_month;
use crate::config::AnonymizeRule;

/// Lowercase hex SHA-256 of `name` immediately followed by `date`.
pub fn pseudonym(name: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(date.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Column indices and schemas for one anonymized file.
#[derive(Debug, Clone)]
pub struct AnonymizePlan {
    name_idx: usize,
    date_idx: usize,
    /// Inferred schema with the name and date columns read as raw text.
    read: SchemaRef,
    output: SchemaRef,
}

impl AnonymizePlan {
    pub fn new(input: &Schema, rule: &AnonymizeRule) -> Result<Self> {
        let (name_idx, _) = input
            .column_with_name(&rule.name_column)
            .ok_or_else(|| anyhow!("name column `{}` not found", rule.name_column))?;
        let (date_idx, date_field) = input
            .column_with_name(&rule.date_column)
            .ok_or_else(|| anyhow!("date column `{}` not found", rule.date_column))?;
        if input.column_with_name(&rule.id_column).is_some() {
            bail!("id column `{}` already exists in input", rule.id_column);
        }
        match date_field.data_type() {
            DataType::Date32
            | DataType::Date64
            | DataType::Timestamp(_, _)
            | DataType::Utf8
            | DataType::LargeUtf8 => {}
            other => bail!(
                "date column `{}` was inferred as {}, not a date",
                rule.date_column,
                other
            ),
        }

        // hashing must see the cell text, not arrow's rendering of a typed value
        let read_fields: Vec<Field> = input
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == name_idx || i == date_idx {
                    Field::new(f.name(), DataType::Utf8, true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();

        let mut fields: Vec<Field> = Vec::with_capacity(input.fields().len());
        for (i, f) in input.fields().iter().enumerate() {
            if i == name_idx {
                continue;
            }
            if i == date_idx {
                fields.push(Field::new(f.name(), DataType::Date32, true));
            } else {
                fields.push(f.as_ref().clone());
            }
        }
        fields.push(Field::new(&rule.id_column, DataType::Utf8, true));

        Ok(Self {
            name_idx,
            date_idx,
            read: Arc::new(Schema::new(read_fields)),
            output: Arc::new(Schema::new(fields)),
        })
    }

    /// Schema to open the CSV reader with.
    pub fn read_schema(&self) -> SchemaRef {
        self.read.clone()
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.output.clone()
    }

    /// Hash, truncate, drop. Row count is unchanged.
    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let names = cast(batch.column(self.name_idx), &DataType::Utf8)
            .context("casting name column to text")?;
        let raw_dates = cast(batch.column(self.date_idx), &DataType::Utf8)
            .context("casting date column to text")?;
        let names = names.as_string::<i32>();
        let raw_dates = raw_dates.as_string::<i32>();

        // null or empty on either side gives a null id
        let mut ids = StringBuilder::with_capacity(batch.num_rows(), batch.num_rows() * 64);
        for (name, date) in names.iter().zip(raw_dates.iter()) {
            match (name, date) {
                (Some(n), Some(d)) if !n.is_empty() && !d.is_empty() => {
                    ids.append_value(pseudonym(n, d))
                }
                _ => ids.append_null(),
            }
        }

        let (month, unparsed) = truncate_to_month(batch.column(self.date_idx))?;
        if unparsed > 0 {
            warn!(unparsed, "date values could not be parsed and were nulled");
        }

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.output.fields().len());
        for (i, col) in batch.columns().iter().enumerate() {
            if i == self.name_idx {
                continue;
            }
            if i == self.date_idx {
                columns.push(month.clone());
            } else {
                columns.push(col.clone());
            }
        }
        columns.push(Arc::new(ids.finish()));

        RecordBatch::try_new(self.output.clone(), columns).context("building anonymized batch")
    }
}
