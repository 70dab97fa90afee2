//! Reconnecting duplex channel.
//!
//! # Architecture
//!
//! ```text
//! TransportHandle ──commands──► Driver task ──► Connection (websocket / memory)
//!        ▲                         │  owns
//!        │ snapshot (watch)        ├── ChannelMachine (state, retry, outbox)
//!        └─────────────────────────┤
//! TransportEvents ◄──events────────┘
//! ```
//!
//! - [`ChannelMachine`] is the pure lifecycle/backoff/outbox logic.
//! - [`Transport::spawn`] runs it as an actor over any [`Connector`].
//! - Inbound frames are decoded here; malformed frames are logged and
//!   dropped, unknown frame types are passed through, and neither affects the
//!   channel state.

mod backoff;
mod connection;
mod driver;
mod error;
mod memory;
mod outbox;
mod state;
mod websocket;

pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};
pub use connection::{BoxFuture, Connection, Connector};
pub use driver::{ChannelSnapshot, Transport, TransportEvent, TransportEvents, TransportHandle};
pub use error::TransportError;
pub use memory::{MemoryConnector, MemoryHub, MemoryListener, MemoryPeer};
pub use outbox::{Outbox, OutboxEntry};
pub use state::{ChannelMachine, ChannelState};
pub use websocket::WebSocketConnector;
