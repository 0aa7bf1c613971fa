use anyhow::{bail, Result};
use std::{env, path::Path};
use to_parquet::inspect::ParquetSummary;

fn main() -> Result<()> {
    // Expect exactly one CLI argument: path to a Parquet file.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        bail!("Usage: {} <PARQUET_FILE>", args[0]);
    }
    let path = Path::new(&args[1]);
    let summary = ParquetSummary::read(path)?;

    println!("=== Parquet File: {} ===", path.display());
    println!(
        "Created by:           {}",
        summary.created_by.as_deref().unwrap_or("<unknown>")
    );
    println!("Total rows:           {}", summary.rows);
    println!("Number of row groups: {}", summary.row_groups);
    println!("File-size on disk:    {} bytes", summary.size_on_disk);
    println!(
        "Compression:          {}",
        summary.codecs.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!();

    println!("=== Columns ===");
    for col in &summary.columns {
        println!(
            "- {:<30} | Physical: {:<10} | Logical: {}",
            col.name,
            col.physical,
            col.logical.as_deref().unwrap_or("<none>")
        );
    }

    Ok(())
}
