//! Foreground sync worker.

use std::io::{BufRead, Write};

use colored::Colorize;
use tracing::warn;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::sync::{StatusUpdate, SyncEngine};

fn status_line(update: &StatusUpdate, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(update)?),
        OutputFormat::Pretty => Ok(format!(
            "{} pushed {}, failed {}  |  pending {}, failed {}, synced {}",
            chrono::Local::now().format("%H:%M:%S").to_string().dimmed(),
            update.batch.pushed.to_string().green(),
            update.batch.failed.to_string().red(),
            update.status.pending,
            update.status.failed,
            update.status.synced
        )),
    }
}

/// Start the scheduler, print a line per batch, and stop when `input`
/// yields a line or reaches EOF.
///
/// # Errors
///
/// Returns `SyncError::Disabled` when no remote is configured, or an error
/// if the worker cannot be started.
pub fn watch<R: BufRead>(
    engine: &SyncEngine,
    mut input: R,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if !engine.is_enabled() {
        return Err(SyncError::Disabled);
    }

    let subscription = engine.on_status_changed(move |update| {
        match status_line(update, format) {
            Ok(line) => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{line}");
                let _ = out.flush();
            }
            Err(e) => warn!(error = %e, "failed to format status update"),
        }
    });

    engine.start()?;
    if format == OutputFormat::Pretty {
        eprintln!("{}", "Watching for changes. Press Enter to stop.".dimmed());
    }

    let mut line = String::new();
    let read = input.read_line(&mut line);

    engine.shutdown();
    engine.unsubscribe(subscription);
    read?;

    match format {
        OutputFormat::Json => Ok(String::new()),
        OutputFormat::Pretty => Ok("Stopped.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::storage::Database;
    use crate::sync::BatchSummary;

    #[test]
    fn test_watch_requires_remote() {
        let engine =
            SyncEngine::new(Database::open_in_memory().unwrap(), SyncConfig::default(), None);
        let err = watch(&engine, std::io::empty(), OutputFormat::Pretty).unwrap_err();
        assert!(matches!(err, SyncError::Disabled));
    }

    #[test]
    fn test_json_status_line_is_single_line() {
        let update = StatusUpdate {
            status: crate::sync::SyncStatus::default(),
            batch: BatchSummary { pushed: 1, failed: 0, skipped: 0 },
        };
        let line = status_line(&update, OutputFormat::Json).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["batch"]["pushed"], 1);
    }
}
