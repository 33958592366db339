//! Outbox storage and management.
//!
//! Every status transition is its own short statement guarded by the
//! expected current status, so the foreground capture path and the
//! background pusher never share a long-lived transaction.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::record::{parse_timestamp, timestamp, Change, ChangeRecord, ChangeStatus, Operation};
use crate::error::SyncError;
use crate::storage::Database;

const SELECT_COLUMNS: &str = "q.id, q.table_name, q.record_id, q.operation, q.payload, q.status,
     q.retry_count, q.error_message, q.created_at, q.synced_at";

/// Which failed records an explicit requeue applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    /// Every failed record
    All,
    /// Only these ids (non-failed ids are ignored)
    Ids(Vec<i64>),
}

/// Row counts by status, taken in one read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub syncing: u64,
    pub failed: u64,
    pub synced: u64,
    pub total: u64,
    /// Capture time of the oldest pending change
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl QueueStats {
    fn add(&mut self, status: ChangeStatus, count: u64) {
        match status {
            ChangeStatus::Pending => self.pending += count,
            ChangeStatus::Syncing => self.syncing += count,
            ChangeStatus::Synced => self.synced += count,
            ChangeStatus::Failed => self.failed += count,
        }
        self.total += count;
    }
}

/// Durable, ordered log of captured changes.
#[derive(Debug, Clone)]
pub struct ChangeQueue {
    db: Database,
}

impl ChangeQueue {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a change using the caller's connection or transaction.
    ///
    /// This is how capture joins the domain transaction: the row commits or
    /// rolls back together with the caller's own writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the insert fails.
    pub fn insert(conn: &Connection, change: &Change) -> Result<ChangeRecord, SyncError> {
        let created_at = Utc::now();
        let payload = change
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r"INSERT INTO sync_queue (table_name, record_id, operation, payload, status, created_at)
              VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                change.table_name,
                change.record_id,
                change.operation.as_str(),
                payload,
                timestamp(created_at),
            ],
        )
        .map_err(|e| SyncError::database("Failed to enqueue change", &e))?;

        Ok(ChangeRecord {
            id: conn.last_insert_rowid(),
            change: change.clone(),
            status: ChangeStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at,
            synced_at: None,
        })
    }

    /// Append a change in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn enqueue(&self, change: &Change) -> Result<ChangeRecord, SyncError> {
        self.db.transaction(|tx| Self::insert(tx, change))
    }

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: i64) -> Result<Option<ChangeRecord>, SyncError> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_queue q WHERE q.id = ?1"),
                [id],
                row_to_record,
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to query change", &e))
        })
    }

    /// List records oldest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(
        &self,
        status: Option<ChangeStatus>,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, SyncError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    r"SELECT {SELECT_COLUMNS} FROM sync_queue q
                      WHERE (?1 IS NULL OR q.status = ?1)
                      ORDER BY q.id ASC
                      LIMIT ?2"
                ))
                .map_err(|e| SyncError::database("Failed to prepare query", &e))?;

            let rows = stmt
                .query_map(
                    params![status.map(|s| s.as_str()), limit_param(limit)],
                    row_to_record,
                )
                .map_err(|e| SyncError::database("Failed to list changes", &e))?;

            collect_rows(rows)
        })
    }

    /// Pending records eligible for a push, oldest first.
    ///
    /// Records of tables whose cursor has sync disabled are left out and stay
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn select_pending(&self, limit: usize) -> Result<Vec<ChangeRecord>, SyncError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    r"SELECT {SELECT_COLUMNS} FROM sync_queue q
                      LEFT JOIN sync_cursors c ON c.table_name = q.table_name
                      WHERE q.status = 'pending' AND COALESCE(c.sync_enabled, 1) = 1
                      ORDER BY q.id ASC
                      LIMIT ?1"
                ))
                .map_err(|e| SyncError::database("Failed to prepare query", &e))?;

            let rows = stmt
                .query_map([limit_param(limit)], row_to_record)
                .map_err(|e| SyncError::database("Failed to query pending changes", &e))?;

            collect_rows(rows)
        })
    }

    /// Move a record from `pending` to `syncing`.
    ///
    /// Returns false when the record is no longer pending (claimed elsewhere
    /// or reset), in which case the caller must not push it.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn claim(&self, id: i64) -> Result<bool, SyncError> {
        self.transition(
            "UPDATE sync_queue SET status = 'syncing' WHERE id = ?1 AND status = 'pending'",
            params![id],
            "Failed to claim change",
        )
    }

    /// Record a successful push.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_synced(&self, id: i64) -> Result<bool, SyncError> {
        self.transition(
            r"UPDATE sync_queue SET
              status = 'synced',
              synced_at = ?1,
              error_message = NULL
              WHERE id = ?2 AND status = 'syncing'",
            params![timestamp(Utc::now()), id],
            "Failed to mark change synced",
        )
    }

    /// Record a failed push.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_failed(&self, id: i64, error: &str) -> Result<bool, SyncError> {
        self.transition(
            r"UPDATE sync_queue SET
              status = 'failed',
              retry_count = retry_count + 1,
              error_message = ?1
              WHERE id = ?2 AND status = 'syncing'",
            params![error, id],
            "Failed to mark change failed",
        )
    }

    fn transition(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        context: &str,
    ) -> Result<bool, SyncError> {
        self.db.with_connection(|conn| {
            let rows = conn
                .execute(sql, params)
                .map_err(|e| SyncError::database(context, &e))?;
            Ok(rows == 1)
        })
    }

    /// Put failed records back to `pending` so a later batch picks them up.
    ///
    /// `retry_count` is kept. With `max_retry_count`, records that already
    /// failed that many times are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn requeue_failed(
        &self,
        selection: &Requeue,
        max_retry_count: Option<u32>,
    ) -> Result<usize, SyncError> {
        const SQL: &str = r"UPDATE sync_queue SET status = 'pending'
              WHERE status = 'failed'
              AND (?1 IS NULL OR retry_count < ?1)";

        self.db.transaction(|tx| {
            let rows = match selection {
                Requeue::All => tx
                    .execute(SQL, params![max_retry_count])
                    .map_err(|e| SyncError::database("Failed to requeue changes", &e))?,
                Requeue::Ids(ids) => {
                    let mut total = 0;
                    for id in ids {
                        total += tx
                            .execute(&format!("{SQL} AND id = ?2"), params![max_retry_count, id])
                            .map_err(|e| SyncError::database("Failed to requeue change", &e))?;
                    }
                    total
                }
            };
            Ok(rows)
        })
    }

    /// Return records stranded in `syncing` to `pending`.
    ///
    /// A record can only be left in `syncing` if the process stopped between
    /// the claim and the outcome. The remote may or may not have applied it;
    /// pushing it again relies on the remote being idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn recover_interrupted(&self) -> Result<usize, SyncError> {
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE sync_queue SET status = 'pending' WHERE status = 'syncing'",
                [],
            )
            .map_err(|e| SyncError::database("Failed to recover interrupted changes", &e))
        })
    }

    /// Delete synced records whose `synced_at` is older than `older_than`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn purge_synced(&self, older_than: Duration) -> Result<usize, SyncError> {
        let cutoff = timestamp(Utc::now() - older_than);

        self.db.with_connection(|conn| {
            conn.execute(
                "DELETE FROM sync_queue WHERE status = 'synced' AND synced_at < ?1",
                [cutoff],
            )
            .map_err(|e| SyncError::database("Failed to purge synced changes", &e))
        })
    }

    /// Counts by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        self.db.with_connection(|conn| {
            let mut stats = QueueStats::default();

            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
                .map_err(|e| SyncError::database("Failed to prepare query", &e))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(|e| SyncError::database("Failed to count changes", &e))?;

            for row in rows {
                let (status, count) = row.map_err(|e| SyncError::database("Failed to read count", &e))?;
                stats.add(status.parse()?, u64::try_from(count).unwrap_or(0));
            }

            let oldest: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM sync_queue WHERE status = 'pending' ORDER BY id ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| SyncError::database("Failed to get oldest pending", &e))?;
            stats.oldest_pending = oldest.as_deref().and_then(parse_timestamp);

            Ok(stats)
        })
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn collect_rows<I>(rows: I) -> Result<Vec<ChangeRecord>, SyncError>
where
    I: Iterator<Item = rusqlite::Result<ChangeRecord>>,
{
    rows.map(|row| row.map_err(|e| SyncError::database("Failed to read change", &e)))
        .collect()
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn row_to_record(row: &Row<'_>) -> Result<ChangeRecord, rusqlite::Error> {
    let operation: String = row.get(3)?;
    let payload: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let synced_at: Option<String> = row.get(9)?;

    let operation: Operation = operation.parse().map_err(|e| conversion_error(3, e))?;
    let status: ChangeStatus = status.parse().map_err(|e| conversion_error(5, e))?;
    let payload = payload
        .map(|p| serde_json::from_str(&p))
        .transpose()
        .map_err(|e| conversion_error(4, e))?;

    Ok(ChangeRecord {
        id: row.get(0)?,
        change: Change {
            table_name: row.get(1)?,
            record_id: row.get(2)?,
            operation,
            payload,
        },
        status,
        retry_count: row.get(6)?,
        error_message: row.get(7)?,
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        synced_at: synced_at.as_deref().and_then(parse_timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_queue() -> ChangeQueue {
        let db = Database::open_in_memory().unwrap();
        ChangeQueue::new(db)
    }

    fn enqueue_many(queue: &ChangeQueue, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                queue
                    .enqueue(&Change::update("contacts", i.to_string(), json!({ "n": i })))
                    .unwrap()
                    .id
            })
            .collect()
    }

    #[test]
    fn test_enqueue_and_get() {
        let queue = create_test_queue();

        let record = queue
            .enqueue(&Change::create("contacts", "42", json!({"name": "Alice"})))
            .unwrap();

        let loaded = queue.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.change.table_name, "contacts");
        assert_eq!(loaded.change.record_id, "42");
        assert_eq!(loaded.change.operation, Operation::Create);
        assert_eq!(loaded.change.payload, Some(json!({"name": "Alice"})));
        assert_eq!(loaded.status, ChangeStatus::Pending);
        assert_eq!(loaded.retry_count, 0);
        assert!(loaded.synced_at.is_none());
    }

    #[test]
    fn test_delete_stores_null_payload() {
        let queue = create_test_queue();
        let record = queue.enqueue(&Change::delete("contacts", "9")).unwrap();

        let loaded = queue.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.change.operation, Operation::Delete);
        assert!(loaded.change.payload.is_none());
    }

    #[test]
    fn test_ids_increase() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_select_pending_oldest_first_with_limit() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 5);

        let pending = queue.select_pending(3).unwrap();
        let selected: Vec<i64> = pending.iter().map(|r| r.id).collect();
        assert_eq!(selected, ids[..3].to_vec());
    }

    #[test]
    fn test_select_pending_skips_disabled_tables() {
        let queue = create_test_queue();
        queue
            .enqueue(&Change::create("contacts", "1", json!({})))
            .unwrap();
        let invoice = queue
            .enqueue(&Change::create("invoices", "1", json!({})))
            .unwrap();

        queue
            .db
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO sync_cursors (table_name, sync_enabled, updated_at) VALUES ('contacts', 0, 'x')",
                    [],
                )
                .map_err(|e| SyncError::database("insert", &e))
            })
            .unwrap();

        let pending = queue.select_pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, invoice.id);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 1);

        assert!(queue.claim(ids[0]).unwrap());
        assert!(!queue.claim(ids[0]).unwrap());
        assert_eq!(queue.get(ids[0]).unwrap().unwrap().status, ChangeStatus::Syncing);
        assert!(queue.select_pending(10).unwrap().is_empty());
    }

    #[test]
    fn test_mark_synced() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 1);

        queue.claim(ids[0]).unwrap();
        assert!(queue.mark_synced(ids[0]).unwrap());

        let loaded = queue.get(ids[0]).unwrap().unwrap();
        assert_eq!(loaded.status, ChangeStatus::Synced);
        assert!(loaded.synced_at.is_some());
        assert!(loaded.error_message.is_none());
    }

    #[test]
    fn test_outcome_requires_claim() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 1);

        assert!(!queue.mark_synced(ids[0]).unwrap());
        assert!(!queue.mark_failed(ids[0], "nope").unwrap());
        assert_eq!(queue.get(ids[0]).unwrap().unwrap().status, ChangeStatus::Pending);
    }

    #[test]
    fn test_mark_failed() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 1);

        queue.claim(ids[0]).unwrap();
        queue.mark_failed(ids[0], "Connection error").unwrap();

        let loaded = queue.get(ids[0]).unwrap().unwrap();
        assert_eq!(loaded.status, ChangeStatus::Failed);
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.error_message, Some("Connection error".to_string()));
    }

    #[test]
    fn test_requeue_failed_keeps_retry_count() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 2);
        for id in &ids {
            queue.claim(*id).unwrap();
            queue.mark_failed(*id, "down").unwrap();
        }

        assert_eq!(queue.requeue_failed(&Requeue::Ids(vec![ids[1]]), None).unwrap(), 1);
        let loaded = queue.get(ids[1]).unwrap().unwrap();
        assert_eq!(loaded.status, ChangeStatus::Pending);
        assert_eq!(loaded.retry_count, 1);

        assert_eq!(queue.requeue_failed(&Requeue::All, None).unwrap(), 1);
        assert_eq!(queue.stats().unwrap().pending, 2);
    }

    #[test]
    fn test_requeue_respects_retry_cap() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 1);
        queue.claim(ids[0]).unwrap();
        queue.mark_failed(ids[0], "down").unwrap();

        assert_eq!(queue.requeue_failed(&Requeue::All, Some(1)).unwrap(), 0);
        assert_eq!(queue.requeue_failed(&Requeue::All, Some(2)).unwrap(), 1);
    }

    #[test]
    fn test_recover_interrupted() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 2);
        queue.claim(ids[0]).unwrap();

        assert_eq!(queue.recover_interrupted().unwrap(), 1);
        assert_eq!(queue.stats().unwrap().pending, 2);
    }

    #[test]
    fn test_purge_only_removes_old_synced() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 3);
        queue.claim(ids[0]).unwrap();
        queue.mark_synced(ids[0]).unwrap();
        queue.claim(ids[1]).unwrap();
        queue.mark_failed(ids[1], "x").unwrap();

        // Nothing is older than a day yet
        assert_eq!(queue.purge_synced(Duration::days(1)).unwrap(), 0);
        // Negative age puts the cutoff in the future
        assert_eq!(queue.purge_synced(Duration::days(-1)).unwrap(), 1);

        assert!(queue.get(ids[0]).unwrap().is_none());
        assert!(queue.get(ids[1]).unwrap().is_some());
        assert!(queue.get(ids[2]).unwrap().is_some());
    }

    #[test]
    fn test_stats_sum_to_total() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 4);
        queue.claim(ids[0]).unwrap();
        queue.mark_synced(ids[0]).unwrap();
        queue.claim(ids[1]).unwrap();
        queue.mark_failed(ids[1], "x").unwrap();
        queue.claim(ids[2]).unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.syncing, 1);
        assert_eq!(stats.synced, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(
            stats.total,
            stats.pending + stats.syncing + stats.synced + stats.failed
        );
        assert!(stats.oldest_pending.is_some());
    }

    #[test]
    fn test_list_by_status() {
        let queue = create_test_queue();
        let ids = enqueue_many(&queue, 3);
        queue.claim(ids[1]).unwrap();
        queue.mark_failed(ids[1], "x").unwrap();

        assert_eq!(queue.list(None, 10).unwrap().len(), 3);
        let failed = queue.list(Some(ChangeStatus::Failed), 10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, ids[1]);
    }
}
