//! Per-session delivery state.
//!
//! A [`TrackedDelivery`] is owned by exactly one session: the producer on the
//! driver side or the consumer on the observer side. The two copies are only
//! ever synchronized through channel messages.

use std::fmt;

use tokio::time::Instant;

use crate::geo::{LatLng, PositionSample};

/// Delivery identifier as used in channel paths and store URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryId(pub u64);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DeliveryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Delivery status.
///
/// Status strings are free-form on the wire. Anything not recognized is kept
/// verbatim in [`DeliveryStatus::Unknown`] so it can still be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeliveryStatus {
    #[default]
    Pending,
    InTransit,
    Demo,
    Delivered,
    Cancelled,
    Unknown(String),
}

impl DeliveryStatus {
    /// Parse a wire status string. Never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "in_transit" => Self::InTransit,
            "demo" => Self::Demo,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire form of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::Demo => "demo",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether no further movement is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Ordered, append-only sequence of points with consecutive-duplicate suppression.
///
/// Points come from the same discretized coordinate source, so exact float
/// equality is the duplicate test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trail {
    points: Vec<LatLng>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trail from points, dropping consecutive duplicates.
    pub fn from_points(points: impl IntoIterator<Item = LatLng>) -> Self {
        let mut trail = Self::new();
        for point in points {
            trail.push(point);
        }
        trail
    }

    /// Append `point` unless it equals the last point. Returns whether it was appended.
    pub fn push(&mut self, point: LatLng) -> bool {
        if self.points.last() == Some(&point) {
            return false;
        }
        self.points.push(point);
        true
    }

    pub fn last(&self) -> Option<&LatLng> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    pub fn to_vec(&self) -> Vec<LatLng> {
        self.points.clone()
    }

    /// Place `earlier` in front of the current points.
    ///
    /// Current points win over `earlier`. If the first current point occurs in
    /// `earlier`, everything from its last occurrence on is dropped, so a
    /// backfill that overlaps or runs ahead of the live stream never repeats
    /// ground the trail already covers.
    pub fn prepend(&mut self, earlier: &[LatLng]) {
        let cut = self
            .points
            .first()
            .and_then(|first| earlier.iter().rposition(|p| p == first))
            .unwrap_or(earlier.len());

        let mut merged = Trail::from_points(earlier[..cut].iter().copied());
        for point in &self.points {
            merged.push(*point);
        }
        *self = merged;
    }
}

/// Session-owned view of one delivery.
#[derive(Debug, Clone)]
pub struct TrackedDelivery {
    pub id: DeliveryId,
    pub destination: Option<LatLng>,
    pub status: DeliveryStatus,
    pub current_position: Option<PositionSample>,
    pub trail: Trail,
    /// When this session last transmitted a position (producer side).
    pub last_sent_at: Option<Instant>,
    /// When the server last echoed one of our positions back (producer side).
    pub last_acked_at: Option<Instant>,
}

impl TrackedDelivery {
    pub fn new(id: DeliveryId) -> Self {
        Self {
            id,
            destination: None,
            status: DeliveryStatus::default(),
            current_position: None,
            trail: Trail::new(),
            last_sent_at: None,
            last_acked_at: None,
        }
    }

    pub fn with_destination(mut self, destination: LatLng) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }
}
