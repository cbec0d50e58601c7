//! Output formatting and persistence for punctuality data.
//!
//! Supports pretty-printing, JSON serialization, CSV append, and the
//! human-readable delay and rate strings shown to operators.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::stats::RealtimeSample;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty(value: &impl std::fmt::Debug) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends a [`RealtimeSample`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, sample: &RealtimeSample) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(sample)?;
    writer.flush()?;

    Ok(())
}

/// Formats a signed delay in seconds as minutes ahead of or behind schedule.
///
/// Zero and NaN read as no delay.
pub fn format_delay(seconds: f64) -> String {
    if seconds == 0.0 || seconds.is_nan() {
        return "0 min".to_string();
    }
    let minutes = (seconds / 60.0).abs();
    if seconds < 0.0 {
        format!("{minutes:.1} min early")
    } else {
        format!("{minutes:.1} min late")
    }
}

/// Formats a percentage with one decimal; a missing rate reads as 0.
pub fn format_rate(rate: Option<f64>) -> String {
    format!("{:.1}%", rate.unwrap_or(0.0))
}
