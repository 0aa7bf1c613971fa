use anyhow::{anyhow, Context, Result};
use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::{
    arrow::ArrowWriter,
    basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel},
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Writer properties for a codec name from the config.
pub fn writer_properties(compression: &str) -> Result<WriterProperties> {
    let codec = match compression.to_ascii_lowercase().as_str() {
        "zstd" => Compression::ZSTD(ZstdLevel::try_new(3)?),
        "brotli" => Compression::BROTLI(BrotliLevel::try_new(5)?),
        "gzip" => Compression::GZIP(GzipLevel::default()),
        "snappy" => Compression::SNAPPY,
        "uncompressed" => Compression::UNCOMPRESSED,
        other => return Err(anyhow!("unknown compression `{}`", other)),
    };
    Ok(WriterProperties::builder()
        .set_compression(codec)
        .set_dictionary_enabled(true)
        .build())
}

/// A Parquet file being written to `<final>.tmp`, renamed into place on `finish`.
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    rows: u64,
}

impl ParquetSink {
    pub fn create(final_path: &Path, schema: SchemaRef, props: WriterProperties) -> Result<Self> {
        let temp_path = temp_path_for(final_path);
        let file = File::create(&temp_path)
            .with_context(|| format!("creating file {}", temp_path.display()))?;
        let writer =
            ArrowWriter::try_new(file, schema, Some(props)).context("creating parquet writer")?;

        Ok(Self {
            writer,
            temp_path,
            final_path: final_path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.write(batch).context("writing batch to parquet")?;
        self.rows += batch.num_rows() as u64;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Close the writer, move the file into place and return its size on disk.
    ///
    /// The temp file is removed if closing or renaming fails.
    pub fn finish(self) -> Result<u64> {
        let Self {
            writer,
            temp_path,
            final_path,
            rows,
        } = self;

        let placed = writer
            .close()
            .context("closing parquet writer")
            .and_then(|_| {
                fs::rename(&temp_path, &final_path).with_context(|| {
                    format!(
                        "renaming {} -> {}",
                        temp_path.display(),
                        final_path.display()
                    )
                })
            });
        if let Err(e) = placed {
            remove_temp(&temp_path);
            return Err(e);
        }

        let bytes = fs::metadata(&final_path)
            .with_context(|| format!("getting file metadata of {}", final_path.display()))?
            .len();
        debug!(out = %final_path.display(), rows, bytes, "parquet file closed");
        Ok(bytes)
    }

    /// Drop the partial file after a failed conversion.
    pub fn abandon(self) {
        drop(self.writer);
        remove_temp(&self.temp_path);
    }
}

fn remove_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path) {
        debug!(path = %temp_path.display(), "could not remove temp file: {}", e);
    }
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
