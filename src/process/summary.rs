use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

pub const MANIFEST_NAME: &str = "_manifest.json";

/// A simple accumulator for rows and bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsAndBytes {
    pub rows: u64,
    pub bytes: u64,
}

impl RowsAndBytes {
    pub const ZERO: Self = RowsAndBytes { rows: 0, bytes: 0 };

    /// Add another RowsAndBytes into `self`, saturating on overflow.
    pub fn add(&mut self, other: RowsAndBytes) {
        self.rows = self.rows.saturating_add(other.rows);
        self.bytes = self.bytes.saturating_add(other.bytes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Converted,
    Skipped { pattern: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    #[serde(flatten)]
    pub status: FileStatus,
    pub counts: RowsAndBytes,
    /// Id column added, when the file matched an anonymize rule.
    pub anonymized: Option<String>,
}

impl FileOutcome {
    pub fn skipped(input: PathBuf, pattern: &str) -> Self {
        Self {
            input,
            output: None,
            status: FileStatus::Skipped {
                pattern: pattern.to_string(),
            },
            counts: RowsAndBytes::ZERO,
            anonymized: None,
        }
    }

    pub fn failed(input: PathBuf, err: &anyhow::Error) -> Self {
        Self {
            input,
            output: None,
            status: FileStatus::Failed {
                error: format!("{:#}", err),
            },
            counts: RowsAndBytes::ZERO,
            anonymized: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub files: Vec<FileOutcome>,
    pub totals: RowsAndBytes,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            finished: None,
            files: Vec::new(),
            totals: RowsAndBytes::ZERO,
        }
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        self.totals.add(outcome.counts);
        self.files.push(outcome);
    }

    pub fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }

    pub fn converted(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Converted))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed { .. }))
    }

    pub fn finish(&mut self) {
        self.finished = Some(Utc::now());
    }

    /// Write `_manifest.json` into `dir`: to tmp file, then rename over original.
    pub fn write_manifest(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_NAME);
        let tmp_path = dir.join(format!(".{}.tmp", MANIFEST_NAME));

        let file = File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut w, self).context("serializing run manifest")?;
        w.write_all(b"\n")?;
        w.flush()?;
        drop(w);

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
        Ok(path)
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
