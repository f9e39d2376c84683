//! Saving search results to disk as JSON or CSV

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::ValueEnum;
use thiserror::Error;

use crate::data::{Field, Record};

/// File formats `mandi search --export` can write
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Pretty-printed array of records
    Json,
    /// One header row, then one row per record
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Export write failed: {0}")]
    Io(#[from] io::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// `mandi_prices_<YYYYmmdd_HHMMSS>.<ext>` in the working directory
pub fn default_path(format: ExportFormat, now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!(
        "mandi_prices_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

/// Writes `records` to `path`, replacing any existing file
pub fn export_to_file(
    records: &[Record],
    format: ExportFormat,
    path: &Path,
) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    write_records(&mut out, records, format)?;
    out.flush()?;
    tracing::debug!(path = %path.display(), records = records.len(), "exported");
    Ok(())
}

pub fn write_records<W: Write>(
    out: W,
    records: &[Record],
    format: ExportFormat,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Json => write_json(out, records),
        ExportFormat::Csv => write_csv(out, records),
    }
}

fn write_json<W: Write>(mut out: W, records: &[Record]) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut out, records)?;
    writeln!(out)?;
    Ok(())
}

/// Canonical columns first, then enrichment columns in order of first appearance
fn write_csv<W: Write>(out: W, records: &[Record]) -> Result<(), ExportError> {
    let mut columns: Vec<&str> = Field::ALL.iter().map(|field| field.name()).collect();
    for record in records {
        for (name, _) in record.fields() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|name| {
            record
                .get(name)
                .map(ToString::to_string)
                .unwrap_or_default()
        }))?;
    }
    writer.flush()?;
    Ok(())
}
