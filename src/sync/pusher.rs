//! Batch pusher for the outbox.
//!
//! Claims pending changes oldest first and pushes them one at a time. Each
//! record's outcome is committed on its own, so one failure never holds back
//! the rest of the batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::cursor::CursorStore;
use super::queue::ChangeQueue;
use super::record::{ChangeRecord, Operation};
use super::remote::RemoteStore;
use crate::error::SyncError;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed,
    Failed(String),
    /// No longer pending when the pusher tried to claim it
    Skipped,
}

/// Result of pushing a single record.
#[derive(Debug, Clone, Serialize)]
pub struct PushResult {
    pub id: i64,
    pub table_name: String,
    pub record_id: String,
    pub operation: Operation,
    #[serde(flatten)]
    pub outcome: PushOutcome,
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub pushed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pushed + self.failed + self.skipped
    }
}

/// Result of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    #[serde(flatten)]
    pub summary: BatchSummary,
    pub results: Vec<PushResult>,
}

impl BatchResult {
    /// Create an empty result.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            summary: BatchSummary {
                pushed: 0,
                failed: 0,
                skipped: 0,
            },
            results: Vec::new(),
        }
    }

    /// Add a result.
    pub fn add(&mut self, result: PushResult) {
        match result.outcome {
            PushOutcome::Pushed => self.summary.pushed += 1,
            PushOutcome::Failed(_) => self.summary.failed += 1,
            PushOutcome::Skipped => self.summary.skipped += 1,
        }
        self.results.push(result);
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.summary.total()
    }
}

/// Pushes pending changes to a [`RemoteStore`].
#[derive(Clone)]
pub struct Pusher {
    queue: ChangeQueue,
    cursors: CursorStore,
    remote: Arc<dyn RemoteStore>,
}

impl Pusher {
    #[must_use]
    pub fn new(queue: ChangeQueue, cursors: CursorStore, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            queue,
            cursors,
            remote,
        }
    }

    /// Push up to `max_items` pending changes.
    ///
    /// Remote failures are recorded per record and never returned as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending changes cannot be read.
    pub fn run_batch(&self, max_items: usize) -> Result<BatchResult, SyncError> {
        let pending = self.queue.select_pending(max_items)?;
        let mut result = BatchResult::empty();
        if pending.is_empty() {
            return Ok(result);
        }

        let mut pushed_tables = BTreeSet::new();
        for record in pending {
            let push = self.push_one(&record);
            if push.outcome == PushOutcome::Pushed {
                pushed_tables.insert(record.change.table_name.clone());
            }
            result.add(push);
        }

        let now = Utc::now();
        for table in pushed_tables {
            if let Err(e) = self.cursors.record_push(&table, now) {
                warn!(table = %table, error = %e, "failed to update sync cursor");
            }
        }

        info!(
            pushed = result.summary.pushed,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            "push batch finished"
        );
        Ok(result)
    }

    fn push_one(&self, record: &ChangeRecord) -> PushResult {
        let outcome = self.attempt(record);
        PushResult {
            id: record.id,
            table_name: record.change.table_name.clone(),
            record_id: record.change.record_id.clone(),
            operation: record.change.operation,
            outcome,
        }
    }

    fn attempt(&self, record: &ChangeRecord) -> PushOutcome {
        let change = &record.change;

        match self.queue.claim(record.id) {
            Ok(true) => {}
            Ok(false) => return PushOutcome::Skipped,
            Err(e) => {
                // Never attempted; the row is still `pending`
                error!(change_id = record.id, error = %e, "failed to claim change");
                return PushOutcome::Skipped;
            }
        }

        match self.remote.push(change) {
            Ok(()) => {
                match self.queue.mark_synced(record.id) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(change_id = record.id, "pushed but no longer syncing; not marked synced");
                        return PushOutcome::Skipped;
                    }
                    Err(e) => {
                        // Left in `syncing`; recovered to `pending` on next start
                        error!(change_id = record.id, error = %e, "pushed but failed to mark synced");
                        return PushOutcome::Failed(e.to_string());
                    }
                }
                info!(
                    change_id = record.id,
                    table = %change.table_name,
                    record_id = %change.record_id,
                    operation = %change.operation,
                    "synced change"
                );
                PushOutcome::Pushed
            }
            Err(remote_err) => {
                let message = remote_err.to_record_message();
                warn!(
                    change_id = record.id,
                    table = %change.table_name,
                    record_id = %change.record_id,
                    operation = %change.operation,
                    error = %message,
                    "failed to sync change"
                );
                match self.queue.mark_failed(record.id, &message) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(change_id = record.id, "push failed but no longer syncing; not marked failed");
                        return PushOutcome::Skipped;
                    }
                    Err(e) => {
                        error!(change_id = record.id, error = %e, "failed to mark change failed");
                    }
                }
                PushOutcome::Failed(message)
            }
        }
    }
}
