//! Historical trail backfill.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::geo::LatLng;

/// Default number of points requested.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Smallest limit the history endpoint honours.
pub const MIN_HISTORY_LIMIT: usize = 10;

/// Largest limit the history endpoint honours.
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Default time allowed for the backfill fetch.
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a history fetch.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("History endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Failed to parse history response: {0}")]
    Decode(String),

    #[error("History fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// External "read history" interface.
pub trait HistorySource: Send + Sync {
    /// Fetch up to `limit` most recent points, oldest first.
    fn fetch(&self, limit: usize) -> impl Future<Output = Result<Vec<LatLng>, HistoryError>> + Send;
}

/// Clamp a requested limit to what the endpoint honours.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT)
}

/// `GET <url>?limit=N` returning `{"coords": [[lat, lng], ...]}`.
pub struct HttpHistory {
    http: reqwest::Client,
    url: Url,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    coords: Vec<LatLng>,
}

impl HttpHistory {
    pub fn new(url: Url) -> Result<Self, HistoryError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| HistoryError::Client(e.to_string()))?;
        Ok(Self { http, url })
    }

    /// Request URL for `limit`, after clamping.
    pub fn request_url(&self, limit: usize) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("limit", &clamp_limit(limit).to_string());
        url
    }
}

impl HistorySource for HttpHistory {
    async fn fetch(&self, limit: usize) -> Result<Vec<LatLng>, HistoryError> {
        let response = self
            .http
            .get(self.request_url(limit))
            .send()
            .await
            .map_err(|e| HistoryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HistoryError::Http(e.to_string()))?;
        let body: HistoryResponse =
            serde_json::from_slice(&bytes).map_err(|e| HistoryError::Decode(e.to_string()))?;

        tracing::debug!(points = body.coords.len(), "History fetched");
        Ok(body.coords)
    }
}

/// Run `source.fetch` under `timeout`.
pub async fn fetch_with_timeout<H: HistorySource>(
    source: &H,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<LatLng>, HistoryError> {
    match tokio::time::timeout(timeout, source.fetch(limit)).await {
        Ok(result) => result,
        Err(_) => Err(HistoryError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowHistory;

    impl HistorySource for SlowHistory {
        async fn fetch(&self, _limit: usize) -> Result<Vec<LatLng>, HistoryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![LatLng::new(1.0, 1.0)])
        }
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 10);
        assert_eq!(clamp_limit(200), 200);
        assert_eq!(clamp_limit(5000), 1000);
    }

    #[test]
    fn test_request_url_carries_clamped_limit() {
        let history =
            HttpHistory::new(Url::parse("https://shop.example.com/apis/delivery/4/pings/").unwrap())
                .unwrap();
        assert_eq!(
            history.request_url(3).as_str(),
            "https://shop.example.com/apis/delivery/4/pings/?limit=10"
        );
        assert_eq!(
            history.request_url(200).as_str(),
            "https://shop.example.com/apis/delivery/4/pings/?limit=200"
        );
    }

    #[test]
    fn test_response_shape() {
        let body: HistoryResponse = serde_json::from_str(
            r#"{"delivery":4,"count":2,"coords":[[1.0,2.0],[3.0,4.0]],"ts":["a","b"]}"#,
        )
        .unwrap();
        assert_eq!(body.coords, vec![LatLng::new(1.0, 2.0), LatLng::new(3.0, 4.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_soft() {
        let result = fetch_with_timeout(&SlowHistory, 200, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(HistoryError::Timeout(_))));
    }
}
