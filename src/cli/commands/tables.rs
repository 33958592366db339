//! Per-table sync switches.

use serde_json::json;

use crate::cli::args::{OutputFormat, TableCommands};
use crate::error::SyncError;
use crate::output::{format_cursors, to_json};
use crate::sync::SyncEngine;

/// List table cursors or toggle one table.
///
/// # Errors
///
/// Returns an error if the cursor store cannot be read or written.
pub fn tables(
    engine: &SyncEngine,
    cmd: Option<TableCommands>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let (table, enabled) = match cmd {
        None => return format_cursors(&engine.cursors()?, format),
        Some(TableCommands::Enable { table }) => (table, true),
        Some(TableCommands::Disable { table }) => (table, false),
    };

    engine.set_table_enabled(&table, enabled)?;

    match format {
        OutputFormat::Json => to_json(&json!({"table": table, "sync_enabled": enabled})),
        OutputFormat::Pretty if enabled => Ok(format!("Sync enabled for '{table}'")),
        OutputFormat::Pretty => Ok(format!(
            "Sync disabled for '{table}'; its changes stay pending until re-enabled"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::storage::Database;

    #[test]
    fn test_disable_then_list() {
        let engine =
            SyncEngine::new(Database::open_in_memory().unwrap(), SyncConfig::default(), None);
        tables(
            &engine,
            Some(TableCommands::Disable { table: "employees".to_string() }),
            OutputFormat::Pretty,
        )
        .unwrap();

        let output = tables(&engine, None, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["items"][0]["table_name"], "employees");
        assert_eq!(value["items"][0]["sync_enabled"], false);
    }
}
