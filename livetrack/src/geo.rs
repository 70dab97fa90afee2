//! Geographic primitives for position tracking.
//!
//! Provides the `LatLng` point type, the validated `PositionSample` emitted by
//! position sources, and great-circle distance helpers shared by the sample
//! gate and the ETA estimator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;
/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;
/// Minimum valid longitude in degrees.
pub const MIN_LNG: f64 = -180.0;
/// Maximum valid longitude in degrees.
pub const MAX_LNG: f64 = 180.0;

/// Errors raised when constructing geographic values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Invalid latitude: {0} (must be within -90..=90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be within -180..=180)")]
    InvalidLongitude(f64),

    #[error("Invalid accuracy: {0} (must be a non-negative number of metres)")]
    InvalidAccuracy(f64),
}

/// A latitude/longitude pair in degrees.
///
/// On the wire a point is a two-element array `[lat, lng]`, which is the
/// shape used by history backfill and route coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Create a point without range validation.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a point, rejecting out-of-range or non-finite coordinates.
    pub fn checked(lat: f64, lng: f64) -> Result<Self, GeoError> {
        validate_lat_lng(lat, lng)?;
        Ok(Self { lat, lng })
    }

    /// Whether both coordinates are finite and within range.
    pub fn is_valid(&self) -> bool {
        validate_lat_lng(self.lat, self.lng).is_ok()
    }

    /// Great-circle distance to another point in metres.
    pub fn distance_m(&self, other: &LatLng) -> f64 {
        haversine_m(*self, *other)
    }

    /// Great-circle distance to another point in kilometres.
    pub fn distance_km(&self, other: &LatLng) -> f64 {
        haversine_km(*self, *other)
    }
}

impl From<[f64; 2]> for LatLng {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(point: LatLng) -> Self {
        [point.lat, point.lng]
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// A single raw fix from a position source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported horizontal accuracy in metres, if the provider gives one.
    pub accuracy_m: Option<f64>,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    /// Create a validated sample.
    pub fn new(
        lat: f64,
        lng: f64,
        accuracy_m: Option<f64>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, GeoError> {
        validate_lat_lng(lat, lng)?;
        if let Some(acc) = accuracy_m {
            if !acc.is_finite() || acc < 0.0 {
                return Err(GeoError::InvalidAccuracy(acc));
            }
        }
        Ok(Self {
            lat,
            lng,
            accuracy_m,
            captured_at,
        })
    }

    /// Create a validated sample captured now.
    pub fn now(lat: f64, lng: f64, accuracy_m: Option<f64>) -> Result<Self, GeoError> {
        Self::new(lat, lng, accuracy_m, Utc::now())
    }

    /// The sample's point.
    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

fn validate_lat_lng(lat: f64, lng: f64) -> Result<(), GeoError> {
    if !lat.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(GeoError::InvalidLatitude(lat));
    }
    if !lng.is_finite() || !(MIN_LNG..=MAX_LNG).contains(&lng) {
        return Err(GeoError::InvalidLongitude(lng));
    }
    Ok(())
}

/// Central angle between two points (haversine formula), in radians.
fn central_angle(from: LatLng, to: LatLng) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1.0 for antipodal points
    2.0 * a.sqrt().min(1.0).asin()
}

/// Great-circle distance in kilometres.
///
/// # Example
///
/// ```
/// use livetrack::geo::{haversine_km, LatLng};
///
/// let nairobi = LatLng::new(-1.286389, 36.817223);
/// assert_eq!(haversine_km(nairobi, nairobi), 0.0);
/// ```
pub fn haversine_km(from: LatLng, to: LatLng) -> f64 {
    EARTH_RADIUS_KM * central_angle(from, to)
}

/// Great-circle distance in metres.
pub fn haversine_m(from: LatLng, to: LatLng) -> f64 {
    EARTH_RADIUS_M * central_angle(from, to)
}
