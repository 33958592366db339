//! Database migrations for bizsync.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::SyncError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, SyncError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SyncError::database("Failed to get schema version", &e))
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), SyncError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| SyncError::database("Failed to set schema version", &e))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), SyncError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), SyncError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(SyncError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: outbox and cursor tables.
///
/// - `sync_queue`: one row per captured mutation, processed in `id` order
/// - `sync_cursors`: per-table push/pull timestamps and overrides
fn migrate_v1(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            record_id TEXT NOT NULL,
            operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
            payload TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'syncing', 'synced', 'failed')),
            retry_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TEXT NOT NULL,
            synced_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_status
        ON sync_queue(status, id);

        CREATE INDEX IF NOT EXISTS idx_sync_queue_record
        ON sync_queue(table_name, record_id);

        -- Captured changes are append-only: corrections are new rows
        CREATE TRIGGER IF NOT EXISTS sync_queue_immutable_change
        BEFORE UPDATE OF table_name, record_id, operation, payload, created_at ON sync_queue
        BEGIN
            SELECT RAISE(ABORT, 'captured changes are immutable');
        END;

        CREATE TABLE IF NOT EXISTS sync_cursors (
            table_name TEXT PRIMARY KEY,
            last_push_at TEXT,
            last_pull_at TEXT,
            sync_enabled INTEGER NOT NULL DEFAULT 1,
            conflict_policy TEXT NOT NULL DEFAULT 'local'
                CHECK (conflict_policy IN ('local', 'remote', 'merge')),
            updated_at TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| SyncError::database("Migration v1 failed", &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO sync_queue (table_name, record_id, operation, payload, created_at)
             VALUES ('contacts', '1', 'create', '{\"name\":\"Alice\"}', '2024-01-01T10:00:00Z')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO sync_cursors (table_name, updated_at) VALUES ('contacts', '2024-01-01T10:00:00Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_unknown_operation() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sync_queue (table_name, record_id, operation, created_at)
             VALUES ('contacts', '1', 'merge', '2024-01-01T10:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_cannot_be_edited() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO sync_queue (table_name, record_id, operation, payload, created_at)
             VALUES ('contacts', '1', 'update', '{}', '2024-01-01T10:00:00Z')",
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE sync_queue SET payload = '{\"x\":1}' WHERE id = 1", [])
            .is_err());
        // Status columns stay writable
        conn.execute("UPDATE sync_queue SET status = 'syncing' WHERE id = 1", [])
            .unwrap();
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
