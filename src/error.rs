//! Error types for bizsync.

use thiserror::Error;

/// Errors raised by the sync engine and its storage layer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid change: {0}")]
    InvalidChange(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Sync is disabled (no remote configured)")]
    Disabled,
}

impl SyncError {
    /// Wrap a rusqlite error with a short description of what was attempted.
    pub fn database(context: &str, err: &rusqlite::Error) -> Self {
        Self::Database(format!("{context}: {err}"))
    }
}

/// Retry policy class for a failed push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Network trouble, timeouts, throttling, server errors.
    Transient,
    /// Validation or schema rejections that will fail again unchanged.
    Permanent,
}

impl std::fmt::Display for RetryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Errors returned by a remote push.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport failure, including request timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The change could not be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Create an API error from status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Classify the failure.
    #[must_use]
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::Http(_) => RetryClass::Transient,
            Self::Api { status, .. } => match *status {
                408 | 425 | 429 | 500..=599 => RetryClass::Transient,
                _ => RetryClass::Permanent,
            },
            Self::InvalidRequest(_) => RetryClass::Permanent,
        }
    }

    /// Message stored in the queue's `error_message` column.
    #[must_use]
    pub fn to_record_message(&self) -> String {
        format!("[{}] {self}", self.retry_class())
    }
}
