//! Storage layer for bizsync.
//!
//! This module provides SQLite-based persistence for the sync outbox and
//! per-table sync metadata. Domain tables live in the same database file.

mod database;
mod migrations;

pub use database::Database;
