//! Change records for the sync outbox.
//!
//! A [`Change`] is what the domain layer captures; a [`ChangeRecord`] is that
//! change once persisted, with its queue metadata.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Kind of mutation applied to a domain record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether a field snapshot travels with the change.
    #[must_use]
    pub const fn carries_payload(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "insert" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(SyncError::InvalidChange(format!(
                "Unknown operation '{other}' (expected create, update or delete)"
            ))),
        }
    }
}

/// Status of a queued change.
///
/// `pending → syncing → synced | failed`. Both `synced` and `failed` are
/// terminal for the pusher; only an explicit requeue moves `failed` back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Waiting to be pushed
    Pending,
    /// Claimed by the pusher
    Syncing,
    /// Accepted by the remote
    Synced,
    /// Rejected or unreachable remote
    Failed,
}

impl ChangeStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Syncing, Self::Synced, Self::Failed];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(SyncError::InvalidChange(format!("Unknown status '{other}'"))),
        }
    }
}

/// A captured mutation: what the remote needs to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub table_name: String,
    pub record_id: String,
    pub operation: Operation,
    /// Full field snapshot for create/update, `None` for delete.
    pub payload: Option<Value>,
}

impl Change {
    #[must_use]
    pub fn create(table: impl Into<String>, record_id: impl Into<String>, payload: Value) -> Self {
        Self {
            table_name: table.into(),
            record_id: record_id.into(),
            operation: Operation::Create,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub fn update(table: impl Into<String>, record_id: impl Into<String>, payload: Value) -> Self {
        Self {
            table_name: table.into(),
            record_id: record_id.into(),
            operation: Operation::Update,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub fn delete(table: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            table_name: table.into(),
            record_id: record_id.into(),
            operation: Operation::Delete,
            payload: None,
        }
    }
}

/// A change as stored in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Insertion order; the pusher processes ascending ids
    pub id: i64,
    #[serde(flatten)]
    pub change: Change,
    pub status: ChangeStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Fixed-width UTC timestamp so stored values sort lexically.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_parsing() {
        assert_eq!("create".parse::<Operation>().unwrap(), Operation::Create);
        assert_eq!("UPDATE".parse::<Operation>().unwrap(), Operation::Update);
        assert_eq!(" delete ".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("upsert".parse::<Operation>().is_err());
    }

    #[test]
    fn test_status_parsing() {
        for status in ChangeStatus::ALL {
            assert_eq!(status.as_str().parse::<ChangeStatus>().unwrap(), status);
        }
        assert!("completed".parse::<ChangeStatus>().is_err());
    }

    #[test]
    fn test_delete_has_no_payload() {
        let change = Change::delete("contacts", "42");
        assert!(change.payload.is_none());
        assert!(!change.operation.carries_payload());

        let change = Change::create("contacts", "42", json!({"name": "Alice"}));
        assert_eq!(change.payload, Some(json!({"name": "Alice"})));
    }

    #[test]
    fn test_timestamp_round_trip_is_fixed_width() {
        let at = parse_timestamp("2024-03-01T08:30:00Z").unwrap();
        let stored = timestamp(at);
        assert_eq!(stored, "2024-03-01T08:30:00.000000Z");
        assert_eq!(parse_timestamp(&stored), Some(at));
    }
}
