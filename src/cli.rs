//! Command-line interface parsing for the mandi price service
//!
//! `mandi` (or `mandi serve`) runs the HTTP API; `mandi search <QUERY>`
//! resolves every source once and prints the matching rows as a text table.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::data::{Field, Record};
use crate::export::ExportFormat;
use crate::filter::keywords;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The query has no keywords once separators are stripped
    #[error("Query '{0}' has no keywords; separate keywords with spaces, commas or periods")]
    EmptyQuery(String),
}

/// Mandi price aggregator - cached commodity prices from government and market feeds
#[derive(Parser, Debug)]
#[command(name = "mandi")]
#[command(about = "Commodity (mandi) price aggregation service")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to config.toml in the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP API (the default)
    Serve {
        /// Socket address to listen on, overriding server.bind
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Fetch every source once and print rows matching any keyword
    ///
    /// Examples:
    ///   mandi search Paddy
    ///   mandi search "Karimnagar,Cotton" --export csv
    Search {
        /// Keywords separated by spaces, commas or periods
        #[arg(value_parser = parse_query_arg)]
        query: String,

        /// Also save the matches to a file in this format
        #[arg(long, value_enum, value_name = "FORMAT")]
        export: Option<ExportFormat>,

        /// Export file (defaults to mandi_prices_<timestamp>.<format>)
        #[arg(long, value_name = "PATH", requires = "export")]
        output: Option<PathBuf>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve { bind: None }
    }
}

/// Accepts a query only if it yields at least one keyword
pub fn parse_query_arg(s: &str) -> Result<String, CliError> {
    if keywords(s).is_empty() {
        Err(CliError::EmptyQuery(s.to_string()))
    } else {
        Ok(s.to_string())
    }
}

const COLUMN_WIDTH: usize = 14;

/// Writes records as a fixed-width table of the canonical fields
pub fn print_table(out: &mut impl Write, title: &str, records: &[Record]) -> io::Result<()> {
    if records.is_empty() {
        writeln!(out, "{}: no records found", title)?;
        return Ok(());
    }

    writeln!(out, "{} - {} records", title, records.len())?;
    let header: Vec<String> = Field::ALL
        .iter()
        .map(|field| cell(field.name()))
        .collect();
    let header = header.join(" | ");
    writeln!(out, "{}", header)?;
    writeln!(out, "{}", "-".repeat(header.chars().count()))?;

    for record in records {
        let row: Vec<String> = Field::ALL
            .iter()
            .map(|field| cell(&record.text(*field)))
            .collect();
        writeln!(out, "{}", row.join(" | "))?;
    }
    Ok(())
}

/// Pads or truncates to the column width, counting characters rather than bytes
fn cell(value: &str) -> String {
    let truncated: String = value.chars().take(COLUMN_WIDTH).collect();
    format!("{:<width$}", truncated, width = COLUMN_WIDTH)
}
