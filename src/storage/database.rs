//! `SQLite` database connection and operations.
//!
//! The database is stored at `~/.bizsync/bizsync.db` and holds the domain
//! tables alongside the sync outbox (`sync_queue`) and per-table sync
//! metadata (`sync_cursors`), so a backup of the file carries outstanding
//! sync work with it.
//!
//! The handle is shared between the foreground (domain writes + capture) and
//! the background sync worker. Every access takes the connection lock for one
//! short statement or transaction only.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

use crate::config::Paths;
use crate::error::SyncError;

use super::migrations;

/// How long a writer waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable, thread-safe database handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open(paths: &Paths) -> Result<Self, SyncError> {
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path).map_err(|e| {
            SyncError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SyncError::database("Failed to set busy timeout", &e))?;

        // WAL keeps readers and the sync worker from blocking domain writes
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(|e| SyncError::database("Failed to enable WAL", &e))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::database("Failed to open in-memory database", &e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, SyncError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| SyncError::database("Failed to enable foreign keys", &e))?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Database("Connection lock poisoned".to_string()))
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// Each statement commits on its own (autocommit).
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or an error if the lock is poisoned.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&Connection) -> Result<T, SyncError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. Domain
    /// writes and their change capture go through here so that both land or
    /// neither does.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or an error if the transaction cannot be
    /// started or committed.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, SyncError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::database("Failed to begin transaction", &e))?;

        // Dropping `tx` without commit rolls back
        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| SyncError::database("Failed to commit transaction", &e))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.with_connection(migrations::get_version).unwrap() > 0);
    }

    #[test]
    fn test_open_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::open_at(&db_path).unwrap();
        assert!(db.with_connection(migrations::get_version).unwrap() > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let db = Database::open_at(&db_path).unwrap();
            db.with_connection(|conn| {
                conn.execute(
                    "INSERT INTO sync_cursors (table_name, updated_at) VALUES ('contacts', 'now')",
                    [],
                )
                .map_err(|e| SyncError::database("insert", &e))
            })
            .unwrap();
        }

        // Reopen - migrations must not wipe existing rows
        let db = Database::open_at(&db_path).unwrap();
        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sync_cursors", [], |row| row.get(0))
                    .map_err(|e| SyncError::database("count", &e))
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
                .map_err(|e| SyncError::database("create", &e))
        })
        .unwrap();

        let result: Result<(), SyncError> = db.transaction(|tx| {
            tx.execute("INSERT INTO notes (body) VALUES ('draft')", [])
                .map_err(|e| SyncError::database("insert", &e))?;
            Err(SyncError::InvalidChange("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
                    .map_err(|e| SyncError::database("count", &e))
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_handle_is_shared_across_threads() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();

        std::thread::spawn(move || {
            other
                .with_connection(|conn| {
                    conn.execute(
                        "INSERT INTO sync_cursors (table_name, updated_at) VALUES ('invoices', 'now')",
                        [],
                    )
                    .map_err(|e| SyncError::database("insert", &e))
                })
                .unwrap();
        })
        .join()
        .unwrap();

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sync_cursors", [], |row| row.get(0))
                    .map_err(|e| SyncError::database("count", &e))
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
