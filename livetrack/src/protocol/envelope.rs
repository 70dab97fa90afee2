//! Wire envelope and per-type payloads.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ProtocolError;
use crate::geo::LatLng;

pub const TYPE_POSITION_UPDATE: &str = "position_update";
pub const TYPE_STATUS: &str = "status";
pub const TYPE_STATUS_UPDATE: &str = "status_update";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_HELLO: &str = "hello";
pub const TYPE_PROBE_ACK: &str = "probe_ack";
pub const TYPE_ROUTE: &str = "route";
pub const TYPE_INIT: &str = "init";
pub const TYPE_TICK: &str = "tick";
pub const TYPE_COMPLETE: &str = "complete";

/// Timestamp as carried on the wire: epoch milliseconds or an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Millis(at.timestamp_millis())
    }

    /// Read a timestamp from any JSON shape a sender might use.
    ///
    /// Floats are taken as epoch milliseconds and truncated. Shapes other than
    /// numbers and strings yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map(Self::Millis),
            Value::String(s) => Some(Self::Text(s)),
            _ => None,
        }
    }

    /// Interpret the timestamp, or `None` if it is out of range or unparseable.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// A point in `{lat, lng}` object form, as used by `init` frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub lat: f64,
    pub lng: f64,
}

impl From<WirePoint> for LatLng {
    fn from(p: WirePoint) -> Self {
        LatLng::new(p.lat, p.lng)
    }
}

impl From<LatLng> for WirePoint {
    fn from(p: LatLng) -> Self {
        Self {
            lat: p.lat,
            lng: p.lng,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Advisory only: a shape that cannot be read is dropped, the frame is kept.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub ts: Option<WireTimestamp>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<WireTimestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(WireTimestamp::from_value))
}

impl PositionUpdate {
    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.ts.as_ref().and_then(WireTimestamp::to_datetime)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub status: String,
}

/// Application-level error. Servers differ in which field they fill, so
/// `error`, `message` and `code` are all accepted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

impl ErrorFrame {
    /// The most specific description available: `error`, then `message`, then `code`.
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if let Some(message) = &self.message {
            return message.clone();
        }
        match &self.code {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "unknown_error".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteFrame {
    #[serde(default)]
    pub coords: Vec<LatLng>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    /// `None` when the routing backend fell back to a straight line.
    #[serde(default)]
    pub duration_min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<WirePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickFrame {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl TickFrame {
    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CompleteFrame {
    pub fn point(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }
}

/// A decoded channel frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    PositionUpdate(PositionUpdate),
    Status(StatusFrame),
    StatusUpdate(StatusFrame),
    Error(ErrorFrame),
    Hello,
    ProbeAck,
    Route(RouteFrame),
    Init(InitFrame),
    Tick(TickFrame),
    Complete(CompleteFrame),
    /// A well-formed frame whose `type` is not recognized. Carries the type.
    Unknown(String),
}

impl Envelope {
    /// Build a `position_update` frame.
    pub fn position(
        point: LatLng,
        status: Option<String>,
        at: Option<DateTime<Utc>>,
    ) -> Self {
        Self::PositionUpdate(PositionUpdate {
            lat: point.lat,
            lng: point.lng,
            status,
            ts: at.map(WireTimestamp::from_datetime),
        })
    }

    /// Build a `status_update` frame.
    pub fn status_update(status: impl Into<String>) -> Self {
        Self::StatusUpdate(StatusFrame {
            status: status.into(),
        })
    }

    /// The wire `type` of this frame.
    pub fn kind(&self) -> &str {
        match self {
            Self::PositionUpdate(_) => TYPE_POSITION_UPDATE,
            Self::Status(_) => TYPE_STATUS,
            Self::StatusUpdate(_) => TYPE_STATUS_UPDATE,
            Self::Error(_) => TYPE_ERROR,
            Self::Hello => TYPE_HELLO,
            Self::ProbeAck => TYPE_PROBE_ACK,
            Self::Route(_) => TYPE_ROUTE,
            Self::Init(_) => TYPE_INIT,
            Self::Tick(_) => TYPE_TICK,
            Self::Complete(_) => TYPE_COMPLETE,
            Self::Unknown(kind) => kind,
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = match &value {
            Value::Object(map) => match map.get("type") {
                Some(Value::String(kind)) => kind.clone(),
                _ => return Err(ProtocolError::MissingType),
            },
            _ => return Err(ProtocolError::NotAnObject),
        };

        let envelope = match kind.as_str() {
            TYPE_POSITION_UPDATE => Self::PositionUpdate(payload(&kind, value)?),
            TYPE_STATUS => Self::Status(payload(&kind, value)?),
            TYPE_STATUS_UPDATE => Self::StatusUpdate(payload(&kind, value)?),
            TYPE_ERROR => Self::Error(payload(&kind, value)?),
            TYPE_HELLO => Self::Hello,
            TYPE_PROBE_ACK => Self::ProbeAck,
            TYPE_ROUTE => Self::Route(payload(&kind, value)?),
            TYPE_INIT => Self::Init(payload(&kind, value)?),
            TYPE_TICK => Self::Tick(payload(&kind, value)?),
            TYPE_COMPLETE => Self::Complete(payload(&kind, value)?),
            _ => Self::Unknown(kind),
        };
        Ok(envelope)
    }

    /// Encode as a JSON value with the `type` field set.
    pub fn to_value(&self) -> Result<Value, ProtocolError> {
        match self {
            Self::PositionUpdate(p) => tagged(self.kind(), p),
            Self::Status(s) | Self::StatusUpdate(s) => tagged(self.kind(), s),
            Self::Error(e) => tagged(self.kind(), e),
            Self::Route(r) => tagged(self.kind(), r),
            Self::Init(i) => tagged(self.kind(), i),
            Self::Tick(t) => tagged(self.kind(), t),
            Self::Complete(c) => tagged(self.kind(), c),
            Self::Hello | Self::ProbeAck | Self::Unknown(_) => {
                Ok(serde_json::json!({ "type": self.kind() }))
            }
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(&self.to_value()?).map_err(ProtocolError::Encode)
    }
}

fn payload<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

fn tagged<T: Serialize>(kind: &str, payload: &T) -> Result<Value, ProtocolError> {
    let mut value = serde_json::to_value(payload).map_err(ProtocolError::Encode)?;
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), Value::String(kind.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_position_update_with_millis() {
        let env = Envelope::decode(
            r#"{"type":"position_update","lat":-1.3,"lng":36.8,"status":"in_transit","ts":1700000000000}"#,
        )
        .unwrap();
        let Envelope::PositionUpdate(p) = env else {
            panic!("expected position_update");
        };
        assert_eq!(p.point(), LatLng::new(-1.3, 36.8));
        assert_eq!(p.status.as_deref(), Some("in_transit"));
        assert_eq!(p.timestamp().unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_decode_position_update_with_iso_timestamp() {
        let env = Envelope::decode(
            r#"{"type":"position_update","lat":1.0,"lng":2.0,"ts":"2024-05-01T10:00:00+00:00"}"#,
        )
        .unwrap();
        let Envelope::PositionUpdate(p) = env else {
            panic!("expected position_update");
        };
        assert_eq!(p.status, None);
        assert_eq!(
            p.timestamp().unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_decode_position_update_with_float_timestamp() {
        let env = Envelope::decode(
            r#"{"type":"position_update","lat":-1.3,"lng":36.8,"ts":1700000000000.0}"#,
        )
        .unwrap();
        let Envelope::PositionUpdate(p) = env else {
            panic!("expected position_update");
        };
        assert_eq!(p.ts, Some(WireTimestamp::Millis(1_700_000_000_000)));
        assert_eq!(p.timestamp().unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_unreadable_timestamp_keeps_the_position() {
        for ts in [r#"{"sec":1}"#, "true", "[1,2]", "null"] {
            let text = format!(r#"{{"type":"position_update","lat":-1.3,"lng":36.8,"ts":{ts}}}"#);
            let Envelope::PositionUpdate(p) = Envelope::decode(&text).unwrap() else {
                panic!("expected position_update for ts {ts}");
            };
            assert_eq!(p.point(), LatLng::new(-1.3, 36.8));
            assert_eq!(p.ts, None, "ts {ts}");
        }

        let text = r#"{"type":"position_update","lat":1.0,"lng":2.0,"ts":"yesterday"}"#;
        let Envelope::PositionUpdate(p) = Envelope::decode(text).unwrap() else {
            panic!("expected position_update");
        };
        assert_eq!(p.timestamp(), None);
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let env = Envelope::decode(r#"{"type":"unknown_future_type","x":1}"#).unwrap();
        assert_eq!(env, Envelope::Unknown("unknown_future_type".to_string()));
        assert_eq!(env.kind(), "unknown_future_type");
    }

    #[test]
    fn test_liveness_frames() {
        assert_eq!(Envelope::decode(r#"{"type":"hello"}"#).unwrap(), Envelope::Hello);
        assert_eq!(
            Envelope::decode(r#"{"type":"probe_ack","n":3}"#).unwrap(),
            Envelope::ProbeAck
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::decode("[1,2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            Envelope::decode(r#"{"lat":1}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"position_update","lat":"north"}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_error_frame_field_precedence() {
        let Envelope::Error(e) = Envelope::decode(r#"{"type":"error","error":"forbidden"}"#).unwrap()
        else {
            panic!("expected error frame");
        };
        assert_eq!(e.describe(), "forbidden");

        let Envelope::Error(e) =
            Envelope::decode(r#"{"type":"error","code":4003,"message":"forbidden"}"#).unwrap()
        else {
            panic!("expected error frame");
        };
        assert_eq!(e.describe(), "forbidden");

        let Envelope::Error(e) = Envelope::decode(r#"{"type":"error","code":4003}"#).unwrap()
        else {
            panic!("expected error frame");
        };
        assert_eq!(e.describe(), "4003");
    }

    #[test]
    fn test_route_with_null_duration() {
        let env = Envelope::decode(
            r#"{"type":"route","coords":[[1.0,2.0],[1.5,2.5]],"distance_km":3.2,"duration_min":null}"#,
        )
        .unwrap();
        let Envelope::Route(r) = env else {
            panic!("expected route");
        };
        assert_eq!(r.coords, vec![LatLng::new(1.0, 2.0), LatLng::new(1.5, 2.5)]);
        assert_eq!(r.distance_km, Some(3.2));
        assert_eq!(r.duration_min, None);
    }

    #[test]
    fn test_simulation_frames_ignore_extra_fields() {
        let env = Envelope::decode(
            r#"{"type":"init","warehouse":{"lat":0,"lng":0},"destination":{"lat":-1.29,"lng":36.82,"latitude":-1.29,"longitude":36.82},"status":"en_route"}"#,
        )
        .unwrap();
        let Envelope::Init(init) = env else {
            panic!("expected init");
        };
        assert_eq!(
            init.destination.map(LatLng::from),
            Some(LatLng::new(-1.29, 36.82))
        );

        let env = Envelope::decode(
            r#"{"type":"tick","lat":1.0,"lng":2.0,"latitude":1.0,"longitude":2.0,"status":"nearby","progress":95.0}"#,
        )
        .unwrap();
        assert!(matches!(env, Envelope::Tick(ref t) if t.progress == Some(95.0)));

        let env = Envelope::decode(r#"{"type":"complete","status":"delivered"}"#).unwrap();
        let Envelope::Complete(c) = env else {
            panic!("expected complete");
        };
        assert_eq!(c.point(), None);
        assert_eq!(c.status.as_deref(), Some("delivered"));
    }

    #[test]
    fn test_encode_position_carries_type_and_omits_missing_fields() {
        let env = Envelope::position(LatLng::new(1.5, 2.5), None, None);
        let value = env.to_value().unwrap();
        assert_eq!(value["type"], "position_update");
        assert_eq!(value["lat"], 1.5);
        assert!(value.get("status").is_none());
        assert!(value.get("ts").is_none());
    }

    #[test]
    fn test_encode_then_decode_position() {
        let at = Utc.timestamp_millis_opt(1_714_557_600_000).single().unwrap();
        let env = Envelope::position(LatLng::new(-1.3, 36.8), Some("demo".into()), Some(at));
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }
}
