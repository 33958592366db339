//! Outbox inspection and maintenance commands.

use std::str::FromStr;

use serde_json::{json, Value};

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::output::{format_record, format_records, to_json};
use crate::sync::{ChangeStatus, Operation, Requeue, SyncEngine};

/// List captured changes, oldest first.
///
/// # Errors
///
/// Returns an error if the status filter is unknown or the query fails.
pub fn list(
    engine: &SyncEngine,
    status: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let status = status.map(ChangeStatus::from_str).transpose()?;
    let records = engine.list(status, limit)?;

    let title = match status {
        None => "Changes",
        Some(ChangeStatus::Pending) => "Pending",
        Some(ChangeStatus::Syncing) => "Syncing",
        Some(ChangeStatus::Synced) => "Synced",
        Some(ChangeStatus::Failed) => "Failed",
    };
    format_records(&records, title, format)
}

/// Capture a change without a domain write.
///
/// # Errors
///
/// Returns an error if the operation or data is invalid, or the insert fails.
pub fn capture(
    engine: &SyncEngine,
    table: &str,
    id: &str,
    operation: &str,
    data: Option<&str>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let operation = Operation::from_str(operation)?;
    let snapshot = data
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|e| SyncError::InvalidChange(format!("--data is not valid JSON: {e}")))?;

    let captured = engine
        .database()
        .transaction(|tx| engine.capture(tx, table, id, operation, snapshot))?;

    match (captured, format) {
        (Some(record), OutputFormat::Json) => to_json(&json!({"captured": true, "change": record})),
        (Some(record), OutputFormat::Pretty) => {
            Ok(format!("Captured change {}\n{}", record.id, format_record(&record, format)?))
        }
        (None, OutputFormat::Json) => to_json(&json!({"captured": false})),
        (None, OutputFormat::Pretty) => {
            Ok("Sync is disabled; nothing captured.".to_string())
        }
    }
}

/// Requeue failed changes.
///
/// # Errors
///
/// Returns `SyncError::NotFound` for an unknown id, or an error if the
/// update fails.
pub fn retry(
    engine: &SyncEngine,
    all: bool,
    id: Option<i64>,
    max_retries: Option<u32>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let selection = match (all, id) {
        (true, _) => Requeue::All,
        (false, Some(id)) => {
            if engine.get(id)?.is_none() {
                return Err(SyncError::NotFound(format!("Change {id}")));
            }
            Requeue::Ids(vec![id])
        }
        (false, None) => {
            return Err(SyncError::Config(
                "Specify --all or provide a change ID".to_string(),
            ));
        }
    };

    let count = engine.retry_failed(&selection, max_retries)?;

    match format {
        OutputFormat::Json => to_json(&json!({"requeued": count})),
        OutputFormat::Pretty => Ok(format!("Requeued {count} failed changes")),
    }
}

/// Delete synced changes past retention.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn purge(
    engine: &SyncEngine,
    older_than_days: Option<u32>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let days = older_than_days.unwrap_or(engine.config().retention_days);
    let count = engine.purge_synced(Some(days))?;

    match format {
        OutputFormat::Json => to_json(&json!({"purged": count, "older_than_days": days})),
        OutputFormat::Pretty => Ok(format!(
            "Purged {count} synced changes older than {days} days"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::error::RemoteError;
    use crate::storage::Database;
    use crate::sync::{Change, RemoteStore};
    use std::sync::Arc;

    struct RejectingRemote;

    impl RemoteStore for RejectingRemote {
        fn push(&self, _change: &Change) -> Result<(), RemoteError> {
            Err(RemoteError::api(400, "bad request"))
        }
    }

    fn engine() -> SyncEngine {
        let config = SyncConfig { enabled: true, ..SyncConfig::default() };
        SyncEngine::new(
            Database::open_in_memory().unwrap(),
            config,
            Some(Arc::new(RejectingRemote)),
        )
    }

    #[test]
    fn test_capture_and_list() {
        let engine = engine();
        let output = capture(
            &engine,
            "contacts",
            "42",
            "create",
            Some(r#"{"id": 42, "name": "Alice"}"#),
            OutputFormat::Json,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["captured"], true);
        assert_eq!(value["change"]["status"], "pending");

        let listed = list(&engine, Some("pending"), 10, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(value["list"], "Pending");
        assert_eq!(value["count"], 1);
    }

    #[test]
    fn test_capture_rejects_bad_input() {
        let engine = engine();
        assert!(capture(&engine, "contacts", "1", "upsert", None, OutputFormat::Json).is_err());
        assert!(capture(&engine, "contacts", "1", "create", Some("{"), OutputFormat::Json).is_err());
        assert!(capture(&engine, "contacts", "1", "create", None, OutputFormat::Json).is_err());
    }

    #[test]
    fn test_capture_disabled() {
        let engine = SyncEngine::new(
            Database::open_in_memory().unwrap(),
            SyncConfig::default(),
            None,
        );
        let output =
            capture(&engine, "contacts", "1", "delete", None, OutputFormat::Pretty).unwrap();
        assert!(output.contains("nothing captured"));
    }

    #[test]
    fn test_retry_after_failure() {
        let engine = engine();
        engine.enqueue(Change::delete("contacts", "1")).unwrap();
        engine.run_batch(10).unwrap();

        let output = retry(&engine, true, None, None, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["requeued"], 1);
        assert_eq!(engine.status().unwrap().pending, 1);
    }

    #[test]
    fn test_retry_unknown_id() {
        let err = retry(&engine(), false, Some(99), None, OutputFormat::Json).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn test_list_is_oldest_first() {
        let engine = engine();
        let first = engine.enqueue(Change::delete("contacts", "1")).unwrap().unwrap();
        let second = engine.enqueue(Change::delete("contacts", "2")).unwrap().unwrap();

        let listed = list(&engine, None, 10, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(value["items"][0]["id"], first.id);
        assert_eq!(value["items"][1]["id"], second.id);
    }

    #[test]
    fn test_list_unknown_status() {
        assert!(list(&engine(), Some("done"), 10, OutputFormat::Json).is_err());
    }
}
