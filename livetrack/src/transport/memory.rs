//! In-memory connectors.
//!
//! Two flavours:
//!
//! - [`MemoryConnector::pair`] hands every accepted connection to a
//!   [`MemoryListener`], so a test can play the server side frame by frame.
//! - [`MemoryHub`] is a relay: every frame a member sends is delivered to all
//!   members, the sender included. This mirrors a channel-group server that
//!   fans out position updates to everyone watching a delivery.
//!
//! Both record connection attempts and can be told to refuse connections,
//! which is how the reconnect/backoff behaviour is tested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::connection::{BoxFuture, Connection, Connector};
use super::TransportError;
use crate::protocol::{Envelope, ProtocolError};

/// Connector over in-process channels.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<ConnectorShared>,
}

struct ConnectorShared {
    route: Route,
    refuse: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
}

enum Route {
    Listener(mpsc::UnboundedSender<MemoryPeer>),
    Hub(MemoryHub),
}

impl MemoryConnector {
    /// A connector whose connections are accepted through the returned listener.
    pub fn pair() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_route(Route::Listener(tx)), MemoryListener { incoming: rx })
    }

    fn with_route(route: Route) -> Self {
        Self {
            shared: Arc::new(ConnectorShared {
                route,
                refuse: AtomicBool::new(false),
                attempts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.lock().len()
    }

    /// Time of every connection attempt so far.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.shared.attempts.lock().clone()
    }

    fn open(&self) -> Result<MemoryConnection, TransportError> {
        self.shared.attempts.lock().push(Instant::now());

        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        match &self.shared.route {
            Route::Listener(accept) => {
                let (to_server, from_client) = mpsc::unbounded_channel();
                let (to_client, from_server) = mpsc::unbounded_channel();
                let peer = MemoryPeer {
                    to_client,
                    from_client,
                };
                accept
                    .send(peer)
                    .map_err(|_| TransportError::Connect("listener closed".to_string()))?;
                Ok(MemoryConnection {
                    outgoing: Some(Outgoing::Peer(to_server)),
                    incoming: from_server,
                })
            }
            Route::Hub(hub) => {
                let incoming = hub.join();
                Ok(MemoryConnection {
                    outgoing: Some(Outgoing::Hub(hub.clone())),
                    incoming,
                })
            }
        }
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>, TransportError>> {
        let result = self.open().map(|c| Box::new(c) as Box<dyn Connection>);
        Box::pin(async move { result })
    }

    fn endpoint(&self) -> String {
        match &self.shared.route {
            Route::Listener(_) => "memory://listener".to_string(),
            Route::Hub(_) => "memory://hub".to_string(),
        }
    }
}

/// Accepts connections made through a [`MemoryConnector::pair`] connector.
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

/// Server end of one in-memory connection.
///
/// Dropping the peer closes the connection from the server side.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Send a raw text frame to the client. Returns `false` if it has gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.to_client.send(text.into()).is_ok()
    }

    pub fn send_envelope(&self, envelope: &Envelope) -> Result<bool, ProtocolError> {
        Ok(self.send(envelope.encode()?))
    }

    /// Next frame written by the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame written by the client, decoded.
    pub async fn recv_envelope(&mut self) -> Option<Result<Envelope, ProtocolError>> {
        self.recv().await.map(|text| Envelope::decode(&text))
    }
}

/// Fan-out relay shared by every connection made through its connectors.
#[derive(Clone, Default)]
pub struct MemoryHub {
    members: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector that joins this hub. Each connector keeps its own
    /// refuse flag and attempt log.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::with_route(Route::Hub(self.clone()))
    }

    fn join(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.members.lock().push(tx);
        rx
    }

    /// Deliver a raw frame to every member. Returns how many received it.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut members = self.members.lock();
        members.retain(|m| m.send(text.to_string()).is_ok());
        members.len()
    }

    /// Deliver a server-originated frame to every member.
    pub fn publish(&self, envelope: &Envelope) -> Result<usize, ProtocolError> {
        Ok(self.broadcast(&envelope.encode()?))
    }

    /// Connected members.
    pub fn member_count(&self) -> usize {
        let mut members = self.members.lock();
        members.retain(|m| !m.is_closed());
        members.len()
    }

    /// Drop every member's connection, as a server restart would.
    pub fn disconnect_all(&self) {
        self.members.lock().clear();
    }
}

enum Outgoing {
    Peer(mpsc::UnboundedSender<String>),
    Hub(MemoryHub),
}

struct MemoryConnection {
    outgoing: Option<Outgoing>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl MemoryConnection {
    fn write(&self, text: String) -> Result<(), TransportError> {
        match &self.outgoing {
            Some(Outgoing::Peer(tx)) => tx.send(text).map_err(|_| TransportError::Closed),
            Some(Outgoing::Hub(hub)) => {
                hub.broadcast(&text);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}

impl Connection for MemoryConnection {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), TransportError>> {
        let result = self.write(text);
        Box::pin(async move { result })
    }

    fn recv_text(&mut self) -> BoxFuture<'_, Option<Result<String, TransportError>>> {
        Box::pin(async move { self.incoming.recv().await.map(Ok) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.outgoing = None;
        self.incoming.close();
        Box::pin(async { Ok(()) })
    }
}
