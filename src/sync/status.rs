//! Queue status aggregation and change notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::pusher::BatchSummary;
use super::queue::ChangeQueue;
use crate::error::SyncError;

/// Snapshot of the outbox as seen by the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub is_syncing: bool,
    pub pending: u64,
    pub syncing: u64,
    pub failed: u64,
    pub synced: u64,
    pub total: u64,
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// Notification published after every completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub status: SyncStatus,
    pub batch: BatchSummary,
}

/// Handle returned by [`StatusReporter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;

/// Computes status from the queue and fans it out to observers.
pub struct StatusReporter {
    queue: ChangeQueue,
    enabled: bool,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
}

impl StatusReporter {
    #[must_use]
    pub const fn new(queue: ChangeQueue, enabled: bool) -> Self {
        Self {
            queue,
            enabled,
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current counts, read from the queue at call time.
    ///
    /// # Errors
    ///
    /// Returns an error if the counts cannot be read.
    pub fn status(&self, is_syncing: bool) -> Result<SyncStatus, SyncError> {
        let stats = self.queue.stats()?;
        Ok(SyncStatus {
            enabled: self.enabled,
            is_syncing,
            pending: stats.pending,
            syncing: stats.syncing,
            failed: stats.failed,
            synced: stats.synced,
            total: stats.total,
            oldest_pending: stats.oldest_pending,
        })
    }

    /// Register a callback for post-batch updates.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Recompute status and notify every observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the counts cannot be read; observers are not
    /// called in that case.
    pub fn publish(&self, batch: BatchSummary) -> Result<StatusUpdate, SyncError> {
        let update = StatusUpdate {
            status: self.status(false)?,
            batch,
        };

        // Callbacks run outside the lock so they may (un)subscribe
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(&update);
        }
        Ok(update)
    }
}
