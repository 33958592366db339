//! Output formatting for bizsync.
//!
//! This module provides formatters for displaying outbox data in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::sync::{BatchResult, ChangeRecord, SyncCursor, SyncStatus};

pub use json::*;
pub use pretty::*;

/// Format engine status based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_status(status: &SyncStatus, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(status)),
        OutputFormat::Json => to_json(status),
    }
}

/// Format a batch result based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_batch(result: &BatchResult, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_batch_pretty(result)),
        OutputFormat::Json => to_json(result),
    }
}

/// Format captured changes based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_records(
    records: &[ChangeRecord],
    title: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_records_pretty(records, title)),
        OutputFormat::Json => format_records_json(records, title),
    }
}

/// Format a single captured change based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_record(record: &ChangeRecord, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_record_pretty(record)),
        OutputFormat::Json => to_json(record),
    }
}

/// Format table cursors based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_cursors(cursors: &[SyncCursor], format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_cursors_pretty(cursors)),
        OutputFormat::Json => format_cursors_json(cursors),
    }
}

/// Format the effective configuration based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_config(config: &SyncConfig, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_config_pretty(config)),
        OutputFormat::Json => format_config_json(config),
    }
}
