//! Configuration management for bizsync.
//!
//! This module handles loading configuration from `~/.bizsync/` and the
//! environment.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{Config, RemoteConfig, SyncConfig};
