//! Path resolution for bizsync configuration and data files.
//!
//! All bizsync data is stored in `~/.bizsync/` (or `$BIZSYNC_HOME`):
//! - `config.yaml` - Engine configuration
//! - `bizsync.db` - SQLite database holding domain data and the sync outbox

use std::path::PathBuf;

use crate::error::SyncError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "BIZSYNC_HOME";

/// Paths to bizsync configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.bizsync/`
    pub root: PathBuf,
    /// Config file: `~/.bizsync/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.bizsync/bizsync.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve paths from `$BIZSYNC_HOME`, falling back to the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, SyncError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            if !root.is_empty() {
                return Ok(Self::with_root(PathBuf::from(root)));
            }
        }

        let home = std::env::var("HOME")
            .map_err(|_| SyncError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".bizsync")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("bizsync.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), SyncError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                SyncError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-bizsync");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("bizsync.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested").join("data"));

        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
    }
}
