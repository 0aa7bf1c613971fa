use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Glob `pattern` inside `dir`, keeping regular files only, sorted by path.
pub fn discover_inputs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let full = full.to_string_lossy();

    let mut paths: Vec<PathBuf> = glob(&full)
        .with_context(|| format!("Failed to read glob pattern '{}'", full))?
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("unreadable glob entry: {}", e);
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();

    paths.sort();
    debug!(pattern = %full, found = paths.len(), "discovered inputs");
    Ok(paths)
}

/// Returns the skip pattern that `file_name` contains, if any.
///
/// Only the file name is matched so a parent directory that happens to carry a
/// bad substring does not hide every file under it.
pub fn is_skipped<'a>(file_name: &str, skip_patterns: &'a [String]) -> Option<&'a str> {
    skip_patterns
        .iter()
        .find(|p| !p.is_empty() && file_name.contains(p.as_str()))
        .map(String::as_str)
}
