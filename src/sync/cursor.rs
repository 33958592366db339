//! Per-table sync metadata.
//!
//! One row per logical table. The pusher stamps `last_push_at` after a batch
//! that pushed at least one change for the table; operators can switch a
//! table off without touching the global flag.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::record::{parse_timestamp, timestamp};
use crate::error::SyncError;
use crate::storage::Database;

/// Declared conflict policy. Stored for forward compatibility; the push-only
/// engine never evaluates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Local,
    Remote,
    Merge,
}

impl ConflictPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merge => "merge",
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            other => Err(SyncError::Config(format!("Unknown conflict policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub table_name: String,
    pub last_push_at: Option<DateTime<Utc>>,
    /// Reserved for pulling remote changes; never written by this engine
    pub last_pull_at: Option<DateTime<Utc>>,
    pub sync_enabled: bool,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone)]
pub struct CursorStore {
    db: Database,
}

impl CursorStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the cursor for a table, if one has been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, table: &str) -> Result<Option<SyncCursor>, SyncError> {
        self.db.with_connection(|conn| {
            conn.query_row(
                r"SELECT table_name, last_push_at, last_pull_at, sync_enabled, conflict_policy
                  FROM sync_cursors WHERE table_name = ?1",
                [table],
                row_to_cursor,
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to query cursor", &e))
        })
    }

    /// All cursors, by table name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<SyncCursor>, SyncError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    r"SELECT table_name, last_push_at, last_pull_at, sync_enabled, conflict_policy
                      FROM sync_cursors ORDER BY table_name",
                )
                .map_err(|e| SyncError::database("Failed to prepare query", &e))?;

            let rows = stmt
                .query_map([], row_to_cursor)
                .map_err(|e| SyncError::database("Failed to list cursors", &e))?;

            let mut cursors = Vec::new();
            for row in rows {
                cursors.push(row.map_err(|e| SyncError::database("Failed to read cursor", &e))?);
            }
            Ok(cursors)
        })
    }

    /// Enable or disable pushing for one table.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn set_enabled(&self, table: &str, enabled: bool) -> Result<(), SyncError> {
        self.db.with_connection(|conn| {
            conn.execute(
                r"INSERT INTO sync_cursors (table_name, sync_enabled, updated_at)
                  VALUES (?1, ?2, ?3)
                  ON CONFLICT(table_name) DO UPDATE SET
                    sync_enabled = excluded.sync_enabled,
                    updated_at = excluded.updated_at",
                params![table, enabled, timestamp(Utc::now())],
            )
            .map_err(|e| SyncError::database("Failed to update cursor", &e))?;
            Ok(())
        })
    }

    /// Stamp a successful push for `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn record_push(&self, table: &str, at: DateTime<Utc>) -> Result<(), SyncError> {
        let at = timestamp(at);
        self.db.with_connection(|conn| {
            conn.execute(
                r"INSERT INTO sync_cursors (table_name, last_push_at, updated_at)
                  VALUES (?1, ?2, ?2)
                  ON CONFLICT(table_name) DO UPDATE SET
                    last_push_at = excluded.last_push_at,
                    updated_at = excluded.updated_at",
                params![table, at],
            )
            .map_err(|e| SyncError::database("Failed to record push", &e))?;
            Ok(())
        })
    }
}

fn row_to_cursor(row: &Row<'_>) -> Result<SyncCursor, rusqlite::Error> {
    let last_push_at: Option<String> = row.get(1)?;
    let last_pull_at: Option<String> = row.get(2)?;
    let policy: String = row.get(4)?;

    Ok(SyncCursor {
        table_name: row.get(0)?,
        last_push_at: last_push_at.as_deref().and_then(parse_timestamp),
        last_pull_at: last_pull_at.as_deref().and_then(parse_timestamp),
        sync_enabled: row.get(3)?,
        // The CHECK constraint keeps unknown values out
        conflict_policy: policy.parse().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CursorStore {
        CursorStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_missing_cursor() {
        assert!(store().get("contacts").unwrap().is_none());
    }

    #[test]
    fn test_record_push_creates_row() {
        let store = store();
        let at = parse_timestamp("2024-05-01T12:00:00Z").unwrap();

        store.record_push("contacts", at).unwrap();

        let cursor = store.get("contacts").unwrap().unwrap();
        assert_eq!(cursor.last_push_at, Some(at));
        assert!(cursor.last_pull_at.is_none());
        assert!(cursor.sync_enabled);
        assert_eq!(cursor.conflict_policy, ConflictPolicy::Local);
    }

    #[test]
    fn test_set_enabled_preserves_push_time() {
        let store = store();
        let at = parse_timestamp("2024-05-01T12:00:00Z").unwrap();
        store.record_push("invoices", at).unwrap();

        store.set_enabled("invoices", false).unwrap();

        let cursor = store.get("invoices").unwrap().unwrap();
        assert!(!cursor.sync_enabled);
        assert_eq!(cursor.last_push_at, Some(at));
    }

    #[test]
    fn test_list_sorted() {
        let store = store();
        store.set_enabled("products", true).unwrap();
        store.set_enabled("contacts", false).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|c| c.table_name).collect();
        assert_eq!(names, vec!["contacts", "products"]);
    }
}
