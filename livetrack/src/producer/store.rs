//! Durable-store fallback for admitted positions.
//!
//! When dual-write persistence is enabled, every admitted position is also
//! appended to an HTTP endpoint that records the delivery's last known
//! location. The append is fire-and-forget: failures are logged by the
//! producer and never retried.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;

/// Default HTTP timeout for a durable-store append.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a durable-store append.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Store rejected append with HTTP {0}")]
    Status(u16),
}

/// Body of one append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistRecord {
    pub delivery_id: u64,
    pub lat: f64,
    pub lng: f64,
    pub status: String,
}

/// External "append position" interface.
pub trait DurableStore: Send + Sync + 'static {
    fn append(&self, record: &PersistRecord) -> impl Future<Output = Result<(), PersistError>> + Send;
}

/// Store that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl DurableStore for NullStore {
    async fn append(&self, _record: &PersistRecord) -> Result<(), PersistError> {
        Ok(())
    }
}

/// POSTs each record as JSON.
pub struct HttpDurableStore {
    http: reqwest::Client,
    url: Url,
}

impl HttpDurableStore {
    pub fn new(url: Url) -> Result<Self, PersistError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| PersistError::Client(e.to_string()))?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl DurableStore for HttpDurableStore {
    async fn append(&self, record: &PersistRecord) -> Result<(), PersistError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(record)
            .send()
            .await
            .map_err(|e| PersistError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::Status(status.as_u16()));
        }

        tracing::trace!(delivery_id = record.delivery_id, "Position persisted");
        Ok(())
    }
}
