//! Socket abstraction.
//!
//! The transport driver only ever talks to a [`Connector`] and the
//! [`Connection`] it produces, so the reconnect logic runs unchanged over a
//! real websocket or the in-memory link used by tests.

use std::future::Future;
use std::pin::Pin;

use super::TransportError;

/// Boxed future returned by the socket traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens connections to one fixed endpoint.
pub trait Connector: Send + Sync + 'static {
    /// Attempt to open a new connection.
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>, TransportError>>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// One open text-frame duplex connection.
pub trait Connection: Send {
    /// Write one text frame.
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Next text frame, or `None` once the peer has closed.
    ///
    /// Must be cancel safe: the driver races it against its command queue.
    fn recv_text(&mut self) -> BoxFuture<'_, Option<Result<String, TransportError>>>;

    /// Write a close frame and shut down.
    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;
}
