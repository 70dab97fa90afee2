//! Distance and arrival-time estimates.
//!
//! The estimator is a straight-line fallback: great-circle distance to the
//! destination at an assumed average road speed. When the server provides a
//! routed path with its own distance and duration, that estimate supersedes
//! this one for the update that carried it.

use crate::geo::{haversine_km, LatLng};

/// Default assumed average speed in km/h.
pub const DEFAULT_SPEED_KMPH: f64 = 30.0;

/// Smallest ETA ever reported, in minutes. "0 min" is never displayed.
pub const MIN_ETA_MINUTES: u32 = 1;

/// Where an estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaSource {
    /// Straight-line distance at the assumed speed.
    Haversine,
    /// Server-computed route.
    Route,
}

/// A distance / time-to-arrival estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eta {
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub source: EtaSource,
}

impl Eta {
    /// Badge text, e.g. `"2.35 km ~ 5 min"`.
    pub fn display(&self) -> String {
        format!("{:.2} km ~ {} min", self.distance_km, self.eta_minutes)
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Straight-line ETA estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaEstimator {
    speed_kmph: f64,
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_KMPH)
    }
}

impl EtaEstimator {
    /// Create an estimator with the given assumed speed.
    ///
    /// Non-positive or non-finite speeds fall back to [`DEFAULT_SPEED_KMPH`].
    pub fn new(speed_kmph: f64) -> Self {
        let speed_kmph = if speed_kmph.is_finite() && speed_kmph > 0.0 {
            speed_kmph
        } else {
            DEFAULT_SPEED_KMPH
        };
        Self { speed_kmph }
    }

    pub fn speed_kmph(&self) -> f64 {
        self.speed_kmph
    }

    /// Estimate from `position` to `destination`.
    pub fn estimate(&self, position: LatLng, destination: LatLng) -> Eta {
        let distance_km = haversine_km(position, destination);
        Eta {
            distance_km,
            eta_minutes: self.minutes_for(distance_km),
            source: EtaSource::Haversine,
        }
    }

    /// Minutes to cover `distance_km` at the assumed speed, floored at one minute.
    pub fn minutes_for(&self, distance_km: f64) -> u32 {
        let minutes = (distance_km / self.speed_kmph * 60.0).round();
        if !minutes.is_finite() {
            return MIN_ETA_MINUTES;
        }
        (minutes as u32).max(MIN_ETA_MINUTES)
    }

    /// Estimate from a server route.
    ///
    /// A route without a duration (the routing backend fell back to a
    /// straight line) takes its minutes from the distance at the assumed speed.
    pub fn from_route(&self, distance_km: f64, duration_min: Option<f64>) -> Eta {
        let eta_minutes = match duration_min {
            Some(d) if d.is_finite() && d >= 0.0 => (d.round() as u32).max(MIN_ETA_MINUTES),
            _ => self.minutes_for(distance_km),
        };
        Eta {
            distance_km,
            eta_minutes,
            source: EtaSource::Route,
        }
    }
}
