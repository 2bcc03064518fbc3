//! Output formatting for CLI results

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::cli::OutputFormat;
use crate::error::Result;

pub mod formatters;
pub mod json;
pub mod table;

/// Trait for types that can be formatted for output
pub trait Formattable {
    /// Format the data according to the specified format
    fn format(&self, format: OutputFormat) -> Result<String>;

    /// Format and print to stdout
    fn print(&self, format: OutputFormat) -> Result<()> {
        println!("{}", self.format(format)?);
        Ok(())
    }
}

impl<T: Tabled + Serialize> Formattable for Vec<T> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(json::format_json(self)?),
            OutputFormat::Table | OutputFormat::Pretty => Ok(table::format_table(self)),
        }
    }
}

/// Spinner for indeterminate waits; hidden for JSON output
pub fn spinner(format: OutputFormat, msg: &str) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Registry rows are opaque JSON objects; columns come from their keys
pub struct Records<'a>(pub &'a [Value]);

impl Formattable for Records<'_> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(json::format_json(self.0)?),
            OutputFormat::Table => Ok(table::format_records(self.0)),
            OutputFormat::Pretty => Ok(self
                .0
                .iter()
                .map(formatters::format_record)
                .collect::<Vec<_>>()
                .join("\n\n")),
        }
    }
}

/// A single registry row
pub struct Record<'a>(pub &'a Value);

impl Formattable for Record<'_> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(json::format_json(self.0)?),
            OutputFormat::Table => Ok(table::format_records(std::slice::from_ref(self.0))),
            OutputFormat::Pretty => Ok(formatters::format_record(self.0)),
        }
    }
}
