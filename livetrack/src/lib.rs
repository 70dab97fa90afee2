//! LiveTrack - live delivery position tracking.
//!
//! A producer (the courier's device) samples its position, filters the
//! samples through a time + distance gate and publishes the survivors over a
//! reconnecting duplex channel. Consumers (customer, operator) subscribe to
//! the same channel, merge a one-shot history backfill with the live stream
//! into a trail, and derive an ETA to the destination.
//!
//! ```text
//!  PositionSource ──► SampleGate ──► Producer ──► Transport ══╗
//!                                        │                    ║ channel
//!                                        └──► DurableStore    ║
//!                                                             ║
//!  HistorySource ──► Consumer ◄── Transport ◄═════════════════╝
//!                       │
//!                       └──► RenderEvent (position, trail, status, ETA, errors)
//! ```

pub mod config;
pub mod consumer;
pub mod delivery;
pub mod eta;
pub mod gate;
pub mod geo;
pub mod logging;
pub mod producer;
pub mod protocol;
pub mod sampler;
pub mod session;
pub mod transport;

pub use consumer::{Consumer, ConsumerConfig, RenderEvent};
pub use delivery::{DeliveryId, DeliveryStatus, TrackedDelivery, Trail};
pub use eta::{Eta, EtaEstimator};
pub use gate::{GateConfig, SampleGate};
pub use geo::{LatLng, PositionSample};
pub use producer::{Producer, ProducerConfig};
pub use protocol::Envelope;
pub use session::SessionContext;
pub use transport::{ChannelState, Transport, TransportEvent, TransportEvents, TransportHandle};
