//! JSON output formatting for bizsync.

use serde::Serialize;
use serde_json::json;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::sync::{ChangeRecord, SyncCursor};

/// Format captured changes as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_records_json(records: &[ChangeRecord], title: &str) -> Result<String, SyncError> {
    let output = json!({
        "list": title,
        "count": records.len(),
        "items": records
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format table cursors as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_cursors_json(cursors: &[SyncCursor]) -> Result<String, SyncError> {
    let output = json!({
        "count": cursors.len(),
        "items": cursors
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format configuration as JSON with the API key masked
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_config_json(config: &SyncConfig) -> Result<String, SyncError> {
    let mut value = serde_json::to_value(config)?;
    if let Some(remote) = value.get_mut("remote").and_then(|r| r.as_object_mut()) {
        remote.insert("api_key".to_string(), json!(config.remote.masked_key()));
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
