//! Channel wire protocol.
//!
//! Every frame is a JSON object whose `type` field selects the payload:
//!
//! ```text
//! position_update   producer -> server -> consumer   lat, lng, status?, ts?
//! status            server -> consumer               status
//! status_update     server -> consumer               status
//! error             server -> consumer               error | message | code
//! hello, probe_ack  server -> consumer               liveness only
//! route             server -> consumer               coords, distance_km, duration_min
//! init              server -> consumer               destination?, status?
//! tick              server -> consumer               lat, lng, status?, progress?
//! complete          server -> consumer               lat?, lng?, status?
//! ```
//!
//! Unrecognized types decode to [`Envelope::Unknown`] rather than an error so
//! that older clients keep working when the server adds frame types.

mod envelope;
mod error;

pub use envelope::{
    CompleteFrame, Envelope, ErrorFrame, InitFrame, PositionUpdate, RouteFrame, StatusFrame,
    TickFrame, WirePoint, WireTimestamp, TYPE_COMPLETE, TYPE_ERROR, TYPE_HELLO, TYPE_INIT,
    TYPE_POSITION_UPDATE, TYPE_PROBE_ACK, TYPE_ROUTE, TYPE_STATUS, TYPE_STATUS_UPDATE, TYPE_TICK,
};
pub use error::ProtocolError;
