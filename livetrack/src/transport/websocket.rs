//! Websocket connector over `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use super::connection::{BoxFuture, Connection, Connector};
use super::TransportError;

/// Connects to a `ws://` or `wss://` endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for `url`.
    ///
    /// Only the scheme is checked here; the handshake validates the rest.
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidUrl {
                url,
                reason: "scheme must be ws or wss".to_string(),
            });
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>, TransportError>> {
        Box::pin(async move {
            let (stream, response) = connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!(url = %self.url, status = %response.status(), "Websocket handshake complete");
            Ok(Box::new(WebSocketConnection { stream }) as Box<dyn Connection>)
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WebSocketConnection {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.stream
                .send(Message::Text(text))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn recv_text(&mut self) -> BoxFuture<'_, Option<Result<String, TransportError>>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text)),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => return Some(Ok(text)),
                        Err(_) => debug!("Dropping non-UTF-8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(frame = ?frame, "Peer sent close frame");
                        return None;
                    }
                    // Ping/pong are answered by tungstenite itself
                    Ok(other) => trace!(frame = ?other, "Ignoring control frame"),
                    Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.stream
                .close(None)
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }
}
