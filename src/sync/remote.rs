//! Remote push capability.
//!
//! The pusher only sees [`RemoteStore`]: one call per change with a fixed
//! success/failure result. [`RestRemote`] implements it against a
//! PostgREST-style backend.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use super::record::{Change, Operation};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Something that can apply a captured change remotely.
///
/// Implementations must be idempotent per `(table, record_id)`: a change may
/// be delivered more than once after a crash.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteStore: Send + Sync {
    /// Apply one change.
    ///
    /// - `create` inserts the payload
    /// - `update` upserts the payload keyed by `record_id`
    /// - `delete` removes the record; an already missing record is success
    ///
    /// # Errors
    ///
    /// Returns an error when the remote is unreachable, times out or rejects
    /// the change.
    fn push(&self, change: &Change) -> Result<(), RemoteError>;
}

/// HTTP client for a PostgREST-compatible REST endpoint.
pub struct RestRemote {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for RestRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestRemote {
    /// Build a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are incomplete or the key is not a
    /// valid header value.
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self, RemoteError> {
        if !config.is_configured() {
            return Err(RemoteError::invalid_request("Remote URL and API key are required"));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(config.api_key.trim())
            .map_err(|_| RemoteError::invalid_request("API key contains invalid characters"))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|_| RemoteError::invalid_request("API key contains invalid characters"))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(schema) = config.schema.as_deref().filter(|s| !s.is_empty()) {
            let value = HeaderValue::from_str(schema)
                .map_err(|_| RemoteError::invalid_request("Schema contains invalid characters"))?;
            headers.insert("Content-Profile", value.clone());
            headers.insert("Accept-Profile", value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn upsert(&self, change: &Change) -> Result<(), RemoteError> {
        let payload = change.payload.as_ref().ok_or_else(|| {
            RemoteError::invalid_request(format!(
                "{} {}.{} has no payload",
                change.operation, change.table_name, change.record_id
            ))
        })?;

        let response = self
            .client
            .post(self.table_url(&change.table_name))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(payload)
            .send()?;

        ensure_success(response)
    }

    fn delete(&self, change: &Change) -> Result<(), RemoteError> {
        let filter = format!("eq.{}", change.record_id);
        let response = self
            .client
            .delete(self.table_url(&change.table_name))
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal")
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(table = %change.table_name, record_id = %change.record_id, "remote record already absent");
            return Ok(());
        }
        ensure_success(response)
    }
}

impl RemoteStore for RestRemote {
    fn push(&self, change: &Change) -> Result<(), RemoteError> {
        match change.operation {
            Operation::Create | Operation::Update => self.upsert(change),
            Operation::Delete => self.delete(change),
        }
    }
}

fn ensure_success(response: Response) -> Result<(), RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().unwrap_or_default();
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    Err(RemoteError::api(status.as_u16(), message))
}
