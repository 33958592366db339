//! The sync engine facade.
//!
//! A [`SyncEngine`] is built once at application startup and handed to the
//! domain services (for capture) and to the UI (for status and manual sync).
//! Stopping the engine cancels its timers; dropping it does the same.

use std::sync::Arc;

use chrono::Duration;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::cursor::{CursorStore, SyncCursor};
use super::hook::{SyncSourceHook, Syncable};
use super::pusher::{BatchResult, Pusher};
use super::queue::{ChangeQueue, Requeue};
use super::record::{Change, ChangeRecord, ChangeStatus, Operation};
use super::remote::{RemoteStore, RestRemote};
use super::scheduler::{Job, Schedule, Scheduler, SingleFlight, Trigger, TriggerOutcome};
use super::status::{StatusReporter, StatusUpdate, SubscriptionId, SyncStatus};
use crate::config::{Config, Paths, SyncConfig};
use crate::error::SyncError;
use crate::storage::Database;

struct EngineInner {
    config: SyncConfig,
    db: Database,
    queue: ChangeQueue,
    cursors: CursorStore,
    hook: SyncSourceHook,
    pusher: Option<Pusher>,
    reporter: StatusReporter,
    flight: SingleFlight,
}

impl EngineInner {
    /// Run one batch; the caller must hold the flight.
    fn run_cycle(&self, max_items: usize) -> Result<BatchResult, SyncError> {
        let Some(pusher) = &self.pusher else {
            return Ok(BatchResult::empty());
        };

        let result = pusher.run_batch(max_items)?;
        self.reporter.publish(result.summary)?;
        Ok(result)
    }

    fn scheduled_cycle(&self, trigger: Trigger) {
        info!(%trigger, "starting sync");
        match self.run_cycle(self.config.batch_size) {
            Ok(result) => info!(
                %trigger,
                pushed = result.summary.pushed,
                failed = result.summary.failed,
                skipped = result.summary.skipped,
                "sync completed"
            ),
            Err(e) => error!(%trigger, error = %e, "error during sync"),
        }
    }
}

/// Local-first change synchronization engine.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    scheduler: Scheduler,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Build an engine over `db`.
    ///
    /// Sync is enabled only when `config.enabled` is set and a remote is
    /// supplied; otherwise capture and push are no-ops.
    #[must_use]
    pub fn new(db: Database, config: SyncConfig, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let enabled = config.enabled && remote.is_some();
        let queue = ChangeQueue::new(db.clone());
        let cursors = CursorStore::new(db.clone());
        let pusher = remote
            .filter(|_| enabled)
            .map(|remote| Pusher::new(queue.clone(), cursors.clone(), remote));
        let flight = SingleFlight::new();

        let inner = EngineInner {
            hook: SyncSourceHook::new(enabled),
            reporter: StatusReporter::new(queue.clone(), enabled),
            config,
            db,
            queue,
            cursors,
            pusher,
            flight: flight.clone(),
        };

        Self {
            inner: Arc::new(inner),
            scheduler: Scheduler::new(flight),
        }
    }

    /// Open the database under `paths` and connect the REST remote when
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn from_config(config: &Config, paths: &Paths) -> Result<Self, SyncError> {
        let db = Database::open(paths)?;
        let sync = config.sync.clone();

        let remote: Option<Arc<dyn RemoteStore>> = if !sync.enabled {
            info!("sync is disabled");
            None
        } else if !sync.remote.is_configured() {
            warn!("sync is enabled but no remote URL/key is configured; sync disabled");
            None
        } else {
            match RestRemote::new(&sync.remote, sync.request_timeout()) {
                Ok(remote) => {
                    info!(url = %sync.remote.url, "remote client initialized");
                    Some(Arc::new(remote) as Arc<dyn RemoteStore>)
                }
                Err(e) => {
                    error!(error = %e, "failed to initialize remote client; sync disabled");
                    None
                }
            }
        };

        Ok(Self::new(db, sync, remote))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.pusher.is_some()
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The shared database handle, for domain services.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Capture hook to call from domain write paths.
    #[must_use]
    pub fn hook(&self) -> SyncSourceHook {
        self.inner.hook
    }

    /// Capture a mutation inside the caller's transaction.
    ///
    /// # Errors
    ///
    /// See [`SyncSourceHook::capture`].
    pub fn capture(
        &self,
        conn: &Connection,
        table: &str,
        record_id: &str,
        operation: Operation,
        snapshot: Option<Value>,
    ) -> Result<Option<ChangeRecord>, SyncError> {
        self.inner.hook.capture(conn, table, record_id, operation, snapshot)
    }

    /// Capture a mutation of a [`Syncable`] entity inside the caller's transaction.
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
        self.inner.hook.capture_entity(conn, entity, operation)
    }

    /// Capture a change in its own transaction, for callers without one.
    ///
    /// # Errors
    ///
    /// See [`SyncSourceHook::capture`].
    pub fn enqueue(&self, change: Change) -> Result<Option<ChangeRecord>, SyncError> {
        let hook = self.inner.hook;
        self.inner.db.transaction(|tx| hook.capture_change(tx, change))
    }

    /// Push up to `max_items` pending changes on the calling thread.
    ///
    /// Returns `None` when another cycle is already running; the call is
    /// dropped rather than queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn run_batch(&self, max_items: usize) -> Result<Option<BatchResult>, SyncError> {
        let Some(_guard) = self.inner.flight.try_begin() else {
            return Ok(None);
        };
        self.inner.run_cycle(max_items).map(Some)
    }

    /// Current status, read at call time.
    ///
    /// # Errors
    ///
    /// Returns an error if the counts cannot be read.
    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        self.inner.reporter.status(self.inner.flight.is_running())
    }

    /// Register a callback fired after every completed batch.
    pub fn on_status_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        self.inner.reporter.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.reporter.unsubscribe(id)
    }

    /// Start the background worker.
    ///
    /// Records left in `syncing` by an earlier run are returned to `pending`
    /// first, unless a cycle or worker is already active in this process. The worker runs a startup cycle and periodic cycles as
    /// configured, and always accepts manual triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery fails or the worker cannot be spawned.
    pub fn start(&self) -> Result<(), SyncError> {
        if !self.is_enabled() {
            info!("sync disabled, scheduler not started");
            return Ok(());
        }

        // Rows in `syncing` only belong to a dead process when no cycle runs here
        match self.inner.flight.try_begin() {
            Some(_guard) if !self.scheduler.is_started() => {
                let recovered = self.inner.queue.recover_interrupted()?;
                if recovered > 0 {
                    warn!(count = recovered, "requeued changes interrupted mid-push");
                }
            }
            _ => debug!("sync already active, skipping interrupted-change recovery"),
        }

        let config = &self.inner.config;
        let schedule = Schedule {
            startup_delay: config.sync_on_startup.then(|| config.startup_delay()),
            interval: config.auto_sync.then(|| config.interval()),
        };

        let inner = Arc::clone(&self.inner);
        let job: Job = Arc::new(move |trigger| inner.scheduled_cycle(trigger));
        self.scheduler.start(schedule, job)
    }

    /// Ask the background worker for an immediate cycle.
    #[must_use]
    pub fn trigger_sync_now(&self) -> TriggerOutcome {
        if !self.is_enabled() {
            return TriggerOutcome::Disabled;
        }
        self.scheduler.trigger_now()
    }

    /// Cancel timers without waiting for a cycle in progress.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Stop and wait for the worker to finish.
    pub fn shutdown(&self) {
        self.scheduler.join();
    }

    /// Explicitly put failed changes back to `pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn retry_failed(
        &self,
        selection: &Requeue,
        max_retry_count: Option<u32>,
    ) -> Result<usize, SyncError> {
        let count = self.inner.queue.requeue_failed(selection, max_retry_count)?;
        info!(count, "requeued failed changes");
        Ok(count)
    }

    /// Delete synced changes older than `days` (configured retention when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn purge_synced(&self, days: Option<u32>) -> Result<usize, SyncError> {
        let days = days.unwrap_or(self.inner.config.retention_days);
        let count = self.inner.queue.purge_synced(Duration::days(i64::from(days)))?;
        info!(count, days, "purged synced changes");
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: i64) -> Result<Option<ChangeRecord>, SyncError> {
        self.inner.queue.get(id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(
        &self,
        status: Option<ChangeStatus>,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, SyncError> {
        self.inner.queue.list(status, limit)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn cursors(&self) -> Result<Vec<SyncCursor>, SyncError> {
        self.inner.cursors.list()
    }

    /// Switch pushing for one table on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_table_enabled(&self, table: &str, enabled: bool) -> Result<(), SyncError> {
        self.inner.cursors.set_enabled(table, enabled)
    }
}
