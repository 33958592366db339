//! Change capture for domain writes.
//!
//! Domain services call the hook from their own write path, passing the
//! transaction that performs the mutation:
//!
//! ```no_run
//! # use bizsync::{Database, SyncSourceHook, Operation, SyncError};
//! # fn demo(db: &Database, hook: &SyncSourceHook) -> Result<(), SyncError> {
//! db.transaction(|tx| {
//!     tx.execute("UPDATE contacts SET name = 'Alice' WHERE id = 42", [])
//!         .map_err(|e| SyncError::database("update contact", &e))?;
//!     hook.capture(tx, "contacts", "42", Operation::Update, Some(serde_json::json!({"id": 42, "name": "Alice"})))?;
//!     Ok(())
//! })
//! # }
//! ```
//!
//! Capture is local-only: it inserts one `pending` row and never touches the
//! network.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::queue::ChangeQueue;
use super::record::{Change, ChangeRecord, Operation};
use crate::error::SyncError;

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .unwrap_or_else(|e| panic!("Invalid table name regex: {e}"))
});

/// A domain entity that replicates to the remote.
pub trait Syncable: Serialize {
    /// Logical collection name, e.g. `"contacts"`.
    const TABLE: &'static str;

    /// Local primary key in string form.
    fn record_id(&self) -> String;

    /// Field snapshot sent with create/update. Defaults to the serde form.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be serialized.
    fn snapshot(&self) -> Result<Value, SyncError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Turns domain mutations into outbox rows.
#[derive(Debug, Clone, Copy)]
pub struct SyncSourceHook {
    enabled: bool,
}

impl SyncSourceHook {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Capture one mutation inside the caller's transaction.
    ///
    /// Returns `None` without writing anything when sync is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid change or a failed insert; the caller
    /// should let it abort the surrounding transaction.
    pub fn capture(
        &self,
        conn: &Connection,
        table: &str,
        record_id: &str,
        operation: Operation,
        snapshot: Option<Value>,
    ) -> Result<Option<ChangeRecord>, SyncError> {
        self.capture_change(
            conn,
            Change {
                table_name: table.to_string(),
                record_id: record_id.to_string(),
                operation,
                payload: snapshot,
            },
        )
    }

    /// Capture a mutation of a [`Syncable`] entity.
    ///
    /// # Errors
    ///
    /// See [`SyncSourceHook::capture`].
    pub fn capture_entity<T: Syncable>(
        &self,
        conn: &Connection,
        entity: &T,
        operation: Operation,
    ) -> Result<Option<ChangeRecord>, SyncError> {
        if !self.enabled {
            return Ok(None);
        }
        let snapshot = if operation.carries_payload() {
            Some(entity.snapshot()?)
        } else {
            None
        };
        self.capture(conn, T::TABLE, &entity.record_id(), operation, snapshot)
    }

    /// Capture a prepared [`Change`].
    ///
    /// # Errors
    ///
    /// See [`SyncSourceHook::capture`].
    pub fn capture_change(
        &self,
        conn: &Connection,
        mut change: Change,
    ) -> Result<Option<ChangeRecord>, SyncError> {
        if !self.enabled {
            debug!(table = %change.table_name, record_id = %change.record_id, "sync disabled, change not captured");
            return Ok(None);
        }

        validate(&mut change)?;
        let record = ChangeQueue::insert(conn, &change)?;

        debug!(
            change_id = record.id,
            table = %change.table_name,
            record_id = %change.record_id,
            operation = %change.operation,
            "captured change"
        );
        Ok(Some(record))
    }
}

fn validate(change: &mut Change) -> Result<(), SyncError> {
    if !TABLE_NAME.is_match(&change.table_name) {
        return Err(SyncError::InvalidChange(format!(
            "Invalid table name '{}'",
            change.table_name
        )));
    }
    if change.record_id.trim().is_empty() {
        return Err(SyncError::InvalidChange(format!(
            "Empty record id for table '{}'",
            change.table_name
        )));
    }

    if change.operation.carries_payload() {
        match &change.payload {
            Some(Value::Object(_)) => {}
            Some(other) => {
                return Err(SyncError::InvalidChange(format!(
                    "Snapshot for {} {}.{} must be an object, got {other}",
                    change.operation, change.table_name, change.record_id
                )));
            }
            None => {
                return Err(SyncError::InvalidChange(format!(
                    "Missing snapshot for {} {}.{}",
                    change.operation, change.table_name, change.record_id
                )));
            }
        }
    } else {
        change.payload = None;
    }
    Ok(())
}
