//! Command implementations for bizsync.
//!
//! Every command returns the text to print; `main` does the printing.

mod changes;
mod tables;
mod watch;

pub use changes::{capture, list, purge, retry};
pub use tables::tables;
pub use watch::watch;

use crate::cli::args::OutputFormat;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::output::{format_batch, format_config, format_status};
use crate::sync::SyncEngine;

/// Execute status command
///
/// # Errors
///
/// Returns an error if the counts cannot be read or output formatting fails.
pub fn status(engine: &SyncEngine, format: OutputFormat) -> Result<String, SyncError> {
    let status = engine.status()?;
    format_status(&status, format)
}

/// Execute run command
///
/// # Errors
///
/// Returns `SyncError::Disabled` when no remote is configured, or an error if
/// the queue cannot be read.
pub fn run(
    engine: &SyncEngine,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if !engine.is_enabled() {
        return Err(SyncError::Disabled);
    }

    let limit = limit.unwrap_or(engine.config().batch_size);
    match engine.run_batch(limit)? {
        Some(result) => format_batch(&result, format),
        None => match format {
            OutputFormat::Json => crate::output::to_json(&serde_json::json!({"skipped": true})),
            OutputFormat::Pretty => Ok("A sync is already in progress.".to_string()),
        },
    }
}

/// Execute config command
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn config(config: &SyncConfig, format: OutputFormat) -> Result<String, SyncError> {
    format_config(config, format)
}
