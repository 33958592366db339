//! Local-first change synchronization.
//!
//! Domain writes are captured into a durable outbox (`sync_queue`) inside the
//! same transaction that performs them. A background worker drains the
//! outbox in id order and pushes each change to the remote, recording the
//! outcome per row.
//!
//! Status lifecycle of a captured change:
//!
//! ```text
//! pending ──claim──▶ syncing ──ok──▶ synced
//!                       │
//!                       └──err──▶ failed ──retry──▶ pending
//! ```

mod cursor;
mod engine;
mod hook;
mod pusher;
mod queue;
mod record;
mod remote;
mod scheduler;
mod status;

pub use cursor::{ConflictPolicy, CursorStore, SyncCursor};
pub use engine::SyncEngine;
pub use hook::{SyncSourceHook, Syncable};
pub use pusher::{BatchResult, BatchSummary, PushOutcome, PushResult, Pusher};
pub use queue::{ChangeQueue, QueueStats, Requeue};
pub use record::{parse_timestamp, timestamp, Change, ChangeRecord, ChangeStatus, Operation};
pub use remote::{RemoteStore, RestRemote};
pub use scheduler::{
    FlightGuard, Job, Schedule, Scheduler, SingleFlight, Trigger, TriggerOutcome,
};
pub use status::{StatusReporter, StatusUpdate, SubscriptionId, SyncStatus};
