//! Transport errors.

use thiserror::Error;

/// Errors raised by connectors and connections.
///
/// The transport driver absorbs all of these: a failed connect or a broken
/// connection moves the channel to `ClosedWillRetry`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Invalid channel URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
