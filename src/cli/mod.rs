//! Command-line interface for bizsync.

pub mod args;
pub mod commands;
