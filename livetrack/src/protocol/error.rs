//! Frame decoding errors.

use thiserror::Error;

/// Errors raised while decoding a wire frame.
///
/// None of these are fatal to a channel. The transport logs them and drops
/// the offending frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// The object has no string `type` field.
    #[error("Frame has no 'type' field")]
    MissingType,

    /// The `type` is known but the payload does not match its shape.
    #[error("Invalid '{kind}' payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Encoding failed.
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}
