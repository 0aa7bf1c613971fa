// src/process/mod.rs
use anyhow::{anyhow, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::config::Config;

pub mod anonymize;
pub mod discover;
pub mod infer;
pub mod month;
pub mod summary;
pub mod write;

use anonymize::AnonymizePlan;
use discover::{discover_inputs, is_skipped};
use summary::{FileOutcome, FileStatus, RowsAndBytes, RunSummary};
use write::{writer_properties, ParquetSink};

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("path {} has no file name", path.display()))
}

/// `<output_dir>/<stem>.parquet`
pub fn output_path_for(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let name = input
        .with_extension("parquet")
        .file_name()
        .map(|n| n.to_owned())
        .ok_or_else(|| anyhow!("path {} has no file name", input.display()))?;
    Ok(output_dir.join(name))
}

fn stream_batches(
    reader: arrow::csv::Reader<fs::File>,
    plan: Option<&AnonymizePlan>,
    sink: &mut ParquetSink,
    file_name: &str,
) -> Result<()> {
    for (idx, batch) in reader.enumerate() {
        let batch =
            batch.with_context(|| format!("CSV parse error in {} at batch {}", file_name, idx))?;
        let batch = match plan {
            Some(p) => p.apply(&batch)?,
            None => batch,
        };
        sink.write(&batch)?;
    }
    Ok(())
}

/// Rows written must equal the data records seen by the inference pass.
fn check_row_count(rows: u64, records: usize) -> Result<()> {
    if rows != records as u64 {
        return Err(anyhow!(
            "wrote {} rows but the file has {} data records",
            rows,
            records
        ));
    }
    Ok(())
}

/// Convert one delimited file into a Parquet file under `config.output_dir`.
///
/// The file is read twice: once to infer column types from every record, once
/// to stream batches through the optional anonymization step into the writer.
#[tracing::instrument(level = "info", skip(path, config), fields(file = %path.display()))]
pub fn convert_file(path: &Path, config: &Config) -> Result<FileOutcome> {
    let start = Instant::now();
    let file_name = file_name_of(path)?;
    let delimiter = config.delimiter_byte()?;
    let out_path = output_path_for(path, &config.output_dir)?;

    // ─── 1) infer schema over the whole file ─────────────────────────
    let (schema, records) = infer::infer_schema(path, delimiter)?;
    debug!(records, columns = schema.fields().len(), "schema inferred");

    // ─── 2) resolve anonymization for this file category ─────────────
    let rule = config.rule_for(&file_name);
    let plan = match rule {
        Some(rule) => Some(
            AnonymizePlan::new(&schema, rule)
                .with_context(|| format!("planning anonymization for {}", file_name))?,
        ),
        None => None,
    };
    let (read_schema, out_schema) = match &plan {
        Some(p) => (p.read_schema(), p.output_schema()),
        None => (schema.clone(), schema),
    };

    // ─── 3) stream batches into the parquet sink ─────────────────────
    let reader = infer::open_reader(path, read_schema, delimiter, config.batch_size)?;
    let mut sink = ParquetSink::create(
        &out_path,
        out_schema,
        writer_properties(&config.compression)?,
    )?;

    if let Err(e) = stream_batches(reader, plan.as_ref(), &mut sink, &file_name) {
        sink.abandon();
        return Err(e);
    }

    let rows = sink.rows();
    if let Err(e) = check_row_count(rows, records) {
        sink.abandon();
        return Err(e.context(format!("converting {}", file_name)));
    }
    let bytes = sink.finish()?;

    info!(
        rows,
        bytes,
        anonymized = rule.is_some(),
        elapsed = ?start.elapsed(),
        "converted"
    );

    Ok(FileOutcome {
        input: path.to_path_buf(),
        output: Some(out_path),
        status: FileStatus::Converted,
        counts: RowsAndBytes { rows, bytes },
        anonymized: rule.map(|r| r.id_column.clone()),
    })
}

/// Convert every input matched by the config, in path order.
pub fn run(config: &Config) -> Result<RunSummary> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;

    let inputs = discover_inputs(&config.input_dir, &config.pattern)?;
    info!(
        dir = %config.input_dir.display(),
        pattern = %config.pattern,
        found = inputs.len(),
        "discovered inputs"
    );

    let mut summary = RunSummary::new();
    for path in inputs {
        let file_name = file_name_of(&path)?;

        if let Some(pattern) = is_skipped(&file_name, &config.skip_patterns) {
            warn!(file = %file_name, pattern, "skipping known-bad file");
            summary.push(FileOutcome::skipped(path, pattern));
            continue;
        }

        match convert_file(&path, config) {
            Ok(outcome) => summary.push(outcome),
            Err(e) if config.continue_on_error => {
                error!(file = %file_name, "conversion failed: {:#}", e);
                summary.push(FileOutcome::failed(path, &e));
            }
            Err(e) => return Err(e.context(format!("converting {}", path.display()))),
        }
    }

    summary.finish();
    if config.manifest {
        let manifest = summary.write_manifest(&config.output_dir)?;
        debug!(path = %manifest.display(), "wrote manifest");
    }

    info!(
        converted = summary.converted(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        rows = summary.totals.rows,
        bytes = summary.totals.bytes,
        "all done"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnonymizeRule;
    use crate::inspect::ParquetSummary;
    use anyhow::Result;
    use arrow::array::{Array, AsArray, Date32Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,to_parquet::process=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const CASES: &str = "DocketNumber|County|FiledDate|Charges\n\
                         CP-51-CR-0000001-2019|Philadelphia|2019-01-04|3\n\
                         CP-02-CR-0000002-2019|Allegheny|2019-02-11|1\n\
                         CP-15-CR-0000003-2019|Chester|2019-03-29|2\n";

    const DEFENDANTS: &str = "DocketNumber|Name|DOB|Race\n\
                              CP-51-CR-0000001-2019|Doe, Jane|1980-01-17|W\n\
                              CP-02-CR-0000002-2019|Roe, John|1975-11-02|B\n";

    // 25 header fields, one row carries 26
    fn broken_sentences() -> String {
        let header: Vec<String> = (0..25).map(|i| format!("c{}", i)).collect();
        let good: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        let bad: Vec<String> = (0..26).map(|i| i.to_string()).collect();
        format!(
            "{}\n{}\n{}\n",
            header.join("|"),
            good.join("|"),
            bad.join("|")
        )
    }

    fn fixture() -> Result<(TempDir, Config)> {
        let root = tempdir()?;
        let data = root.path().join("_data");
        fs::create_dir_all(&data)?;
        fs::write(data.join("CPCMS_CaseData.txt"), CASES)?;
        fs::write(data.join("CPCMS_DefendantData.txt"), DEFENDANTS)?;
        fs::write(data.join("CPCMS_SentenceData.txt"), broken_sentences())?;
        fs::write(data.join("README.md"), "not an input")?;

        let config = Config {
            input_dir: data,
            output_dir: root.path().join("out"),
            anonymize: vec![AnonymizeRule {
                file_contains: "CPCMS_DefendantData".into(),
                name_column: "Name".into(),
                date_column: "DOB".into(),
                id_column: "PersonID".into(),
            }],
            ..Config::default()
        };
        Ok((root, config))
    }

    #[test]
    fn output_path_reuses_stem() -> Result<()> {
        let out = output_path_for(Path::new("../_data/CPCMS_CaseData.txt"), Path::new("out"))?;
        assert_eq!(out, Path::new("out/CPCMS_CaseData.parquet"));
        Ok(())
    }

    #[test]
    fn convert_preserves_row_count() -> Result<()> {
        init_test_logging();
        let (_root, config) = fixture()?;
        fs::create_dir_all(&config.output_dir)?;

        let outcome = convert_file(&config.input_dir.join("CPCMS_CaseData.txt"), &config)?;
        assert_eq!(outcome.status, FileStatus::Converted);
        assert_eq!(outcome.counts.rows, 3);
        assert!(outcome.anonymized.is_none());

        let out = outcome.output.unwrap();
        let summary = ParquetSummary::read(&out)?;
        assert_eq!(summary.rows, 3);
        let names: Vec<_> = summary.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["DocketNumber", "County", "FiledDate", "Charges"]);
        Ok(())
    }

    #[test]
    fn run_skips_anonymizes_and_writes_manifest() -> Result<()> {
        init_test_logging();
        let (_root, config) = fixture()?;

        let summary = run(&config)?;
        assert_eq!(summary.converted(), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.totals.rows, 5);

        let out = &config.output_dir;
        assert!(out.join("CPCMS_CaseData.parquet").exists());
        assert!(out.join("CPCMS_DefendantData.parquet").exists());
        assert!(!out.join("CPCMS_SentenceData.parquet").exists());
        assert!(!out.join("README.parquet").exists());
        assert!(out.join(summary::MANIFEST_NAME).exists());

        let file = File::open(out.join("CPCMS_DefendantData.parquet"))?;
        let batches: Vec<_> = ParquetRecordBatchReaderBuilder::try_new(file)?
            .build()?
            .collect::<std::result::Result<_, _>>()?;
        let batch = &batches[0];
        let schema = batch.schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["DocketNumber", "DOB", "Race", "PersonID"]);

        let ids = batch.column(3).as_string::<i32>();
        assert_eq!(ids.value(0), anonymize::pseudonym("Doe, Jane", "1980-01-17"));
        assert_eq!(ids.value(1), anonymize::pseudonym("Roe, John", "1975-11-02"));

        let dob = batch.column(1).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(dob.len(), 2);
        assert_eq!(dob.value_as_date(0).unwrap().to_string(), "1980-01-01");
        assert_eq!(dob.value_as_date(1).unwrap().to_string(), "1975-11-01");
        Ok(())
    }

    #[test]
    fn malformed_file_aborts_by_default() -> Result<()> {
        init_test_logging();
        let (_root, mut config) = fixture()?;
        config.skip_patterns.clear();

        let err = run(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("CPCMS_SentenceData"));
        assert!(!config
            .output_dir
            .join("CPCMS_SentenceData.parquet.tmp")
            .exists());
        Ok(())
    }

    #[test]
    fn continue_on_error_records_failure() -> Result<()> {
        init_test_logging();
        let (_root, mut config) = fixture()?;
        config.skip_patterns.clear();
        config.continue_on_error = true;

        let summary = run(&config)?;
        assert_eq!(summary.converted(), 2);
        assert_eq!(summary.failed(), 1);
        let failed = summary
            .files
            .iter()
            .find(|f| matches!(f.status, FileStatus::Failed { .. }))
            .unwrap();
        assert!(failed.input.ends_with("CPCMS_SentenceData.txt"));
        Ok(())
    }

    #[test]
    fn missing_anonymize_column_fails_the_file() -> Result<()> {
        init_test_logging();
        let (_root, mut config) = fixture()?;
        config.anonymize[0].date_column = "BirthDate".into();
        fs::create_dir_all(&config.output_dir)?;

        let err = convert_file(&config.input_dir.join("CPCMS_DefendantData.txt"), &config)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("BirthDate"));
        Ok(())
    }

    fn read_single_batch(path: &Path) -> Result<arrow::record_batch::RecordBatch> {
        let batches: Vec<_> = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?
            .build()?
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(batches.len(), 1);
        Ok(batches.into_iter().next().unwrap())
    }

    #[test]
    fn timestamp_dob_and_numeric_name_are_hashed_as_written() -> Result<()> {
        init_test_logging();
        let (_root, config) = fixture()?;
        fs::write(
            config.input_dir.join("CPCMS_DefendantData.txt"),
            "DocketNumber|Name|DOB|Race\n\
             CP-1|00123|1980-01-17 00:00:00|W\n\
             CP-2|00456|1975-11-02 08:30:00|B\n",
        )?;

        run(&config)?;
        let batch = read_single_batch(&config.output_dir.join("CPCMS_DefendantData.parquet"))?;

        let ids = batch.column(3).as_string::<i32>();
        assert_eq!(ids.value(0), anonymize::pseudonym("00123", "1980-01-17 00:00:00"));
        assert_eq!(ids.value(1), anonymize::pseudonym("00456", "1975-11-02 08:30:00"));

        let dob = batch.column(1).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(dob.value_as_date(0).unwrap().to_string(), "1980-01-01");
        assert_eq!(dob.value_as_date(1).unwrap().to_string(), "1975-11-01");
        Ok(())
    }

    #[test]
    fn text_dob_and_missing_fields_end_to_end() -> Result<()> {
        init_test_logging();
        let (_root, config) = fixture()?;
        fs::write(
            config.input_dir.join("CPCMS_DefendantData.txt"),
            "DocketNumber|Name|DOB|Race\n\
             CP-1|Doe, Jane|01/17/1980|W\n\
             CP-2||11/02/1975|B\n\
             CP-3|Roe, Rick||W\n",
        )?;

        let summary = run(&config)?;
        let outcome = summary
            .files
            .iter()
            .find(|f| f.input.ends_with("CPCMS_DefendantData.txt"))
            .unwrap();
        assert_eq!(outcome.counts.rows, 3);
        assert_eq!(outcome.anonymized.as_deref(), Some("PersonID"));

        let batch = read_single_batch(&config.output_dir.join("CPCMS_DefendantData.parquet"))?;
        assert_eq!(batch.num_rows(), 3);

        let ids = batch.column(3).as_string::<i32>();
        assert_eq!(ids.value(0), anonymize::pseudonym("Doe, Jane", "01/17/1980"));
        assert!(ids.is_null(1));
        assert!(ids.is_null(2));

        let dob = batch.column(1).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(dob.value_as_date(0).unwrap().to_string(), "1980-01-01");
        assert_eq!(dob.value_as_date(1).unwrap().to_string(), "1975-11-01");
        assert!(dob.is_null(2));
        Ok(())
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        assert!(check_row_count(3, 3).is_ok());
        let err = check_row_count(2, 3).unwrap_err();
        assert!(err.to_string().contains("wrote 2 rows"));
    }
}
