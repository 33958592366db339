//! Configuration settings for bizsync.
//!
//! Settings are loaded from `~/.bizsync/config.yaml` and then overridden by
//! environment variables, so deployments can configure the remote without
//! touching the file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::SyncError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Sync engine settings.
    pub sync: SyncConfig,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Global switch. Capture and push are no-ops while disabled.
    pub enabled: bool,
    /// Remote backend connection.
    pub remote: RemoteConfig,
    /// Seconds between periodic push cycles.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Run one cycle shortly after startup.
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
    /// Run periodic cycles.
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    /// Delay before the startup cycle, in seconds.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
    /// Maximum records pushed per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout for a single remote request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Age in days after which synced records may be purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// Remote backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST service, e.g. `https://xyz.example.co`.
    pub url: String,
    /// API key sent as `apikey` and bearer token.
    pub api_key: String,
    /// Optional schema profile header.
    #[serde(default)]
    pub schema: Option<String>,
}

impl RemoteConfig {
    /// True when both URL and key are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// API key with everything but the last four characters hidden.
    #[must_use]
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{visible}", "*".repeat(chars.len() - 4))
    }
}

const fn default_interval() -> u64 {
    300
}

const fn default_true() -> bool {
    true
}

const fn default_startup_delay() -> u64 {
    5
}

const fn default_batch_size() -> usize {
    100
}

const fn default_request_timeout() -> u64 {
    10
}

const fn default_retention_days() -> u32 {
    7
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote: RemoteConfig::default(),
            interval_secs: default_interval(),
            sync_on_startup: default_true(),
            auto_sync: default_true(),
            startup_delay_secs: default_startup_delay(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout(),
            retention_days: default_retention_days(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Recognised: `SYNC_ENABLED`, `SYNC_REMOTE_URL`, `SYNC_REMOTE_KEY`,
    /// `SYNC_INTERVAL`, `SYNC_ON_STARTUP`, `SYNC_AUTO`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SYNC_ENABLED") {
            self.enabled = parse_bool("SYNC_ENABLED", &v)?;
        }
        if let Some(v) = lookup("SYNC_REMOTE_URL") {
            self.remote.url = v;
        }
        if let Some(v) = lookup("SYNC_REMOTE_KEY") {
            self.remote.api_key = v;
        }
        if let Some(v) = lookup("SYNC_INTERVAL") {
            self.interval_secs = v.trim().parse().map_err(|_| {
                SyncError::Config(format!("SYNC_INTERVAL must be a number of seconds, got '{v}'"))
            })?;
        }
        if let Some(v) = lookup("SYNC_ON_STARTUP") {
            self.sync_on_startup = parse_bool("SYNC_ON_STARTUP", &v)?;
        }
        if let Some(v) = lookup("SYNC_AUTO") {
            self.auto_sync = parse_bool("SYNC_AUTO", &v)?;
        }
        Ok(())
    }

    /// Reject settings the scheduler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.interval_secs == 0 {
            return Err(SyncError::Config("interval_secs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be greater than 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, SyncError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(SyncError::Config(format!("{name} must be true or false, got '{other}'"))),
    }
}

impl Config {
    /// Load configuration from the default path and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or an
    /// environment override is invalid.
    pub fn load(paths: &Paths) -> Result<Self, SyncError> {
        let mut config = Self::load_from_path(&paths.config_file)?;
        config.sync.apply_env(|key| std::env::var(key).ok())?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })
    }
}
