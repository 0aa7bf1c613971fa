use anyhow::{Context, Result};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::{collections::BTreeSet, fs::File, path::Path};

/// One leaf column of a Parquet schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub physical: String,
    pub logical: Option<String>,
}

/// File-level facts read back from a Parquet footer.
#[derive(Debug, Clone)]
pub struct ParquetSummary {
    pub rows: i64,
    pub row_groups: usize,
    pub created_by: Option<String>,
    pub size_on_disk: u64,
    pub columns: Vec<ColumnInfo>,
    /// Codecs used by any column chunk, e.g. `ZSTD(ZstdLevel(3))`.
    pub codecs: BTreeSet<String>,
}

impl ParquetSummary {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = SerializedFileReader::new(file)
            .with_context(|| format!("reading parquet footer of {}", path.display()))?;
        let meta = reader.metadata();
        let file_meta = meta.file_metadata();

        let columns = file_meta
            .schema_descr()
            .columns()
            .iter()
            .map(|c| ColumnInfo {
                name: c.name().to_string(),
                physical: format!("{:?}", c.physical_type()),
                logical: c.logical_type().map(|lt| format!("{:?}", lt)),
            })
            .collect();

        let mut codecs = BTreeSet::new();
        for rg in meta.row_groups() {
            for col in rg.columns() {
                codecs.insert(format!("{:?}", col.compression()));
            }
        }

        Ok(Self {
            rows: file_meta.num_rows(),
            row_groups: meta.num_row_groups(),
            created_by: file_meta.created_by().map(str::to_string),
            size_on_disk: std::fs::metadata(path)
                .with_context(|| format!("reading metadata of {}", path.display()))?
                .len(),
            columns,
            codecs,
        })
    }
}
