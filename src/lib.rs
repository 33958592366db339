//! bizsync - local-first change synchronization for business data
//!
//! Domain writes land in a local SQLite database and are captured into a
//! durable outbox in the same transaction. A background worker pushes the
//! outbox to a remote REST backend in batches, one change at a time.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use config::{Config, Paths, SyncConfig};
pub use error::{RemoteError, RetryClass, SyncError};
pub use storage::Database;
pub use sync::{
    Change, ChangeRecord, ChangeStatus, Operation, SyncEngine, SyncSourceHook, SyncStatus,
    Syncable,
};
