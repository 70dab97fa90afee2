//! Merges historical backfill with the live stream.
//!
//! # Precedence
//!
//! ```text
//! history arrives, no live point yet   --> trail := history
//! history arrives after live points    --> trail := history up to the first live point ++ live
//! live point equal to last trail point --> ignored
//! live point otherwise                 --> appended
//! ```
//!
//! Live points already applied are never removed by a later backfill.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::delivery::{DeliveryId, DeliveryStatus, TrackedDelivery, Trail};
use crate::geo::{LatLng, PositionSample};

/// What a live position did to the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    /// Appended to the trail.
    Appended,
    /// Same as the last point; position refreshed, trail unchanged.
    Duplicate,
    /// Coordinates out of range; ignored.
    Invalid,
}

/// Consumer-side trail state.
#[derive(Debug, Clone)]
pub struct StreamReconciler {
    delivery: TrackedDelivery,
    live_seen: bool,
    history_applied: bool,
}

impl StreamReconciler {
    pub fn new(id: DeliveryId) -> Self {
        Self::from_delivery(TrackedDelivery::new(id))
    }

    pub fn from_delivery(delivery: TrackedDelivery) -> Self {
        Self {
            delivery,
            live_seen: false,
            history_applied: false,
        }
    }

    pub fn delivery(&self) -> &TrackedDelivery {
        &self.delivery
    }

    pub fn into_delivery(self) -> TrackedDelivery {
        self.delivery
    }

    pub fn trail(&self) -> &[LatLng] {
        self.delivery.trail.points()
    }

    pub fn history_applied(&self) -> bool {
        self.history_applied
    }

    /// Apply the one-shot backfill, ordered oldest first.
    pub fn apply_history(&mut self, points: Vec<LatLng>) {
        if self.history_applied {
            debug!("History already applied; ignoring second backfill");
            return;
        }
        self.history_applied = true;

        let valid: Vec<LatLng> = points.into_iter().filter(LatLng::is_valid).collect();
        if self.live_seen {
            self.delivery.trail.prepend(&valid);
        } else {
            self.delivery.trail = Trail::from_points(valid);
        }
        debug!(points = self.delivery.trail.len(), live_first = self.live_seen, "Backfill merged");
    }

    /// Apply a live position.
    pub fn apply_position(&mut self, point: LatLng, at: Option<DateTime<Utc>>) -> PositionOutcome {
        let sample = match PositionSample::new(point.lat, point.lng, None, at.unwrap_or_else(Utc::now)) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Ignoring out-of-range position");
                return PositionOutcome::Invalid;
            }
        };

        self.live_seen = true;
        self.delivery.current_position = Some(sample);
        if self.delivery.trail.push(point) {
            PositionOutcome::Appended
        } else {
            PositionOutcome::Duplicate
        }
    }

    /// Apply a status string. Returns `true` if the status changed.
    pub fn apply_status(&mut self, status: &str) -> bool {
        let status = DeliveryStatus::parse(status);
        if self.delivery.status == status {
            return false;
        }
        self.delivery.status = status;
        true
    }

    pub fn set_destination(&mut self, destination: LatLng) {
        self.delivery.destination = Some(destination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng)
    }

    #[test]
    fn test_history_then_live_with_repeat() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_history(vec![p(1.0, 1.0), p(2.0, 2.0)]);
        assert_eq!(r.apply_position(p(2.0, 2.0), None), PositionOutcome::Duplicate);
        assert_eq!(r.apply_position(p(3.0, 3.0), None), PositionOutcome::Appended);
        assert_eq!(r.trail(), &[p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)]);
    }

    #[test]
    fn test_live_then_history_keeps_live_points() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_position(p(2.0, 2.0), None);
        r.apply_position(p(3.0, 3.0), None);
        r.apply_history(vec![p(1.0, 1.0), p(2.0, 2.0)]);
        assert_eq!(r.trail(), &[p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)]);
    }

    #[test]
    fn test_history_newer_than_first_live_point_does_not_backtrack() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_position(p(2.0, 2.0), None);
        r.apply_history(vec![p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)]);
        assert_eq!(r.trail(), &[p(1.0, 1.0), p(2.0, 2.0)]);
        assert_eq!(r.apply_position(p(3.0, 3.0), None), PositionOutcome::Appended);
        assert_eq!(r.trail(), &[p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)]);
    }

    #[test]
    fn test_live_then_disjoint_history() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_position(p(5.0, 5.0), None);
        r.apply_history(vec![p(1.0, 1.0), p(2.0, 2.0)]);
        assert_eq!(r.trail(), &[p(1.0, 1.0), p(2.0, 2.0), p(5.0, 5.0)]);
    }

    #[test]
    fn test_empty_history_leaves_trail() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_position(p(5.0, 5.0), None);
        r.apply_history(Vec::new());
        assert_eq!(r.trail(), &[p(5.0, 5.0)]);
        assert!(r.history_applied());
    }

    #[test]
    fn test_history_applied_once() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_history(vec![p(1.0, 1.0)]);
        r.apply_history(vec![p(9.0, 9.0)]);
        assert_eq!(r.trail(), &[p(1.0, 1.0)]);
    }

    #[test]
    fn test_history_dedups_and_drops_invalid_points() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        r.apply_history(vec![p(1.0, 1.0), p(1.0, 1.0), p(95.0, 0.0), p(2.0, 2.0)]);
        assert_eq!(r.trail(), &[p(1.0, 1.0), p(2.0, 2.0)]);
    }

    #[test]
    fn test_invalid_live_point_is_ignored() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        assert_eq!(r.apply_position(p(0.0, 200.0), None), PositionOutcome::Invalid);
        assert!(r.trail().is_empty());
        assert!(r.delivery().current_position.is_none());
    }

    #[test]
    fn test_duplicate_still_refreshes_position_time() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        let t1 = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let t2 = DateTime::parse_from_rfc3339("2024-05-01T10:00:30Z").unwrap().with_timezone(&Utc);
        r.apply_position(p(1.0, 1.0), Some(t1));
        r.apply_position(p(1.0, 1.0), Some(t2));
        assert_eq!(r.delivery().current_position.unwrap().captured_at, t2);
        assert_eq!(r.trail().len(), 1);
    }

    #[test]
    fn test_status_changes() {
        let mut r = StreamReconciler::new(DeliveryId(1));
        assert!(r.apply_status("in_transit"));
        assert!(!r.apply_status("in_transit"));
        assert!(r.apply_status("nearby"));
        assert_eq!(
            r.delivery().status,
            DeliveryStatus::Unknown("nearby".to_string())
        );
    }
}
