use anyhow::{Context, Result};
use arrow::{
    csv::{reader::Format, Reader, ReaderBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};
use tracing::debug;

fn csv_format(delimiter: u8) -> Format {
    Format::default()
        .with_header(true)
        .with_delimiter(delimiter)
        .with_quote(b'"')
}

/// Infer column types from every record in `path`.
///
/// Returns the schema and the number of data records scanned. Columns that are
/// empty in every row come back from arrow as `Null` and are widened to `Utf8`.
pub fn infer_schema(path: &Path, delimiter: u8) -> Result<(SchemaRef, usize)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let (inferred, records) = csv_format(delimiter)
        .infer_schema(BufReader::new(file), None)
        .with_context(|| format!("inferring schema of {}", path.display()))?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| match f.data_type() {
            DataType::Null => Field::new(f.name(), DataType::Utf8, true),
            _ => f.as_ref().clone().with_nullable(true),
        })
        .collect();

    debug!(
        file = %path.display(),
        columns = fields.len(),
        records,
        "inferred schema"
    );
    Ok((Arc::new(Schema::new(fields)), records))
}

/// Batch reader over `path` using an already inferred `schema`.
pub fn open_reader(
    path: &Path,
    schema: SchemaRef,
    delimiter: u8,
    batch_size: usize,
) -> Result<Reader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    ReaderBuilder::new(schema)
        .with_header(true)
        .with_delimiter(delimiter)
        .with_quote(b'"')
        .with_batch_size(batch_size)
        .build(file)
        .with_context(|| format!("creating CSV reader for {}", path.display()))
}
