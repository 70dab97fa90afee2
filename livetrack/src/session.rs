//! Session context.
//!
//! Everything a producer or consumer needs to know about where it is running
//! is resolved once, at session start, into a [`SessionContext`] and passed
//! in explicitly.

use reqwest::Url;
use thiserror::Error;

use crate::delivery::DeliveryId;

/// Placeholder replaced with the delivery id in endpoint path templates.
pub const DELIVERY_ID_PLACEHOLDER: &str = "{id}";

/// Errors raised while resolving session endpoints.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Unsupported origin scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("Invalid endpoint path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Where this session's delivery lives.
#[derive(Debug, Clone)]
pub struct SessionContext {
    origin: Url,
    delivery_id: DeliveryId,
    channel_override: Option<String>,
}

impl SessionContext {
    /// Create a context for `delivery_id` served from `origin` (`http` or `https`).
    pub fn new(origin: &str, delivery_id: DeliveryId) -> Result<Self, SessionError> {
        let origin_url = Url::parse(origin).map_err(|e| SessionError::InvalidOrigin {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        match origin_url.scheme() {
            "http" | "https" => {}
            other => return Err(SessionError::UnsupportedScheme(other.to_string())),
        }
        Ok(Self {
            origin: origin_url,
            delivery_id,
            channel_override: None,
        })
    }

    /// Use `url` as the channel endpoint instead of deriving it from the origin.
    pub fn with_channel_url(mut self, url: impl Into<String>) -> Self {
        self.channel_override = Some(url.into());
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn delivery_id(&self) -> DeliveryId {
        self.delivery_id
    }

    /// Channel endpoint: `<origin>/ws/delivery/track/<id>/`, over `wss` when the
    /// origin is `https` and `ws` otherwise.
    pub fn channel_url(&self) -> Result<String, SessionError> {
        if let Some(url) = &self.channel_override {
            return Ok(url.clone());
        }

        let scheme = if self.origin.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        let mut url = self.origin.clone();
        url.set_scheme(scheme)
            .map_err(|_| SessionError::UnsupportedScheme(self.origin.scheme().to_string()))?;
        url.set_path(&format!("/ws/delivery/track/{}/", self.delivery_id));
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }

    /// Resolve an HTTP endpoint path template against the origin.
    pub fn endpoint(&self, template: &str) -> Result<Url, SessionError> {
        let path = template.replace(DELIVERY_ID_PLACEHOLDER, &self.delivery_id.to_string());
        self.origin.join(&path).map_err(|e| SessionError::InvalidPath {
            path,
            reason: e.to_string(),
        })
    }
}
