//! Background cadence for push cycles.
//!
//! One worker thread waits for the next trigger (startup delay, periodic
//! interval or a manual request) and runs the job. [`SingleFlight`] makes sure
//! at most one cycle executes at a time across the worker and any direct
//! callers; a trigger that arrives while a cycle is running is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SyncError;

/// Why a cycle ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Periodic,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Startup => write!(f, "startup"),
            Self::Periodic => write!(f, "periodic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Result of asking for an immediate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The worker will run a cycle
    Accepted,
    /// A cycle is already running or already requested
    Dropped,
    /// No worker is running
    NotStarted,
    /// Sync is globally disabled
    Disabled,
}

/// Single-flight flag shared by everything that can run a cycle.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

/// Clears the flag when dropped.
#[derive(Debug)]
pub struct FlightGuard {
    running: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the flight, or `None` if another cycle holds it.
    #[must_use]
    pub fn try_begin(&self) -> Option<FlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                running: Arc::clone(&self.running),
            })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// When the worker fires on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Run once this long after start
    pub startup_delay: Option<Duration>,
    /// Run repeatedly with this gap
    pub interval: Option<Duration>,
}

/// Work executed for each trigger while holding the flight.
pub type Job = Arc<dyn Fn(Trigger) + Send + Sync>;

#[derive(Debug, Default)]
struct Signal {
    stop: bool,
    wake: bool,
}

#[derive(Debug, Default)]
struct Shared {
    signal: Mutex<Signal>,
    condvar: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Signal> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the background worker thread.
#[derive(Debug)]
pub struct Scheduler {
    flight: SingleFlight,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(flight: SingleFlight) -> Self {
        Self {
            flight,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. A second call while it is alive is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(&self, schedule: Schedule, job: Job) -> Result<(), SyncError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            if !handle.is_finished() && !self.shared.lock().stop {
                *worker = Some(handle);
                return Ok(());
            }
            // A stopped worker may still be finishing its last cycle
            if handle.join().is_err() {
                warn!("sync worker panicked");
            }
        }

        *self.shared.lock() = Signal::default();

        let shared = Arc::clone(&self.shared);
        let flight = self.flight.clone();
        let handle = std::thread::Builder::new()
            .name("bizsync-worker".to_string())
            .spawn(move || worker_loop(&shared, &flight, schedule, &job))?;

        info!(
            startup_delay = ?schedule.startup_delay,
            interval = ?schedule.interval,
            "sync scheduler started"
        );
        *worker = Some(handle);
        Ok(())
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Ask the worker for a cycle now.
    ///
    /// Dropped, not queued, when a cycle is already running.
    pub fn trigger_now(&self) -> TriggerOutcome {
        if !self.is_started() {
            return TriggerOutcome::NotStarted;
        }
        if self.flight.is_running() {
            debug!("manual sync dropped: cycle already running");
            return TriggerOutcome::Dropped;
        }

        let mut signal = self.shared.lock();
        if signal.stop {
            return TriggerOutcome::NotStarted;
        }
        if signal.wake {
            return TriggerOutcome::Dropped;
        }
        signal.wake = true;
        self.shared.condvar.notify_all();
        TriggerOutcome::Accepted
    }

    /// Cancel the timers. A cycle in progress finishes on its own; this does
    /// not wait for it.
    pub fn stop(&self) {
        let mut signal = self.shared.lock();
        if !signal.stop {
            signal.stop = true;
            self.shared.condvar.notify_all();
            info!("sync scheduler stopping");
        }
    }

    /// Stop and wait for the worker to exit, including any cycle in progress.
    pub fn join(&self) {
        self.stop();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("sync worker panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, flight: &SingleFlight, schedule: Schedule, job: &Job) {
    let started = Instant::now();
    let mut startup_at = schedule.startup_delay.map(|delay| started + delay);
    let mut next_tick = schedule.interval.map(|interval| started + interval);

    loop {
        let Some(trigger) = next_trigger(shared, schedule, &mut startup_at, &mut next_tick) else {
            debug!("sync worker exiting");
            return;
        };

        match flight.try_begin() {
            Some(_guard) => {
                debug!(%trigger, "sync cycle starting");
                job(trigger);
            }
            None => debug!(%trigger, "sync cycle dropped: already running"),
        }
    }
}

/// Block until the next trigger, or `None` once stopped.
fn next_trigger(
    shared: &Shared,
    schedule: Schedule,
    startup_at: &mut Option<Instant>,
    next_tick: &mut Option<Instant>,
) -> Option<Trigger> {
    let mut signal = shared.lock();
    loop {
        if signal.stop {
            return None;
        }
        if signal.wake {
            signal.wake = false;
            return Some(Trigger::Manual);
        }

        let now = Instant::now();
        if startup_at.is_some_and(|at| now >= at) {
            *startup_at = None;
            return Some(Trigger::Startup);
        }
        if let (Some(at), Some(interval)) = (*next_tick, schedule.interval) {
            if now >= at {
                *next_tick = Some(now + interval);
                return Some(Trigger::Periodic);
            }
        }

        let deadline = match (*startup_at, *next_tick) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        signal = match deadline {
            Some(at) => {
                shared
                    .condvar
                    .wait_timeout(signal, at.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .condvar
                .wait(signal)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
