//! Sample admission gate.
//!
//! Position providers emit fixes at their own cadence, anywhere from several
//! per second to one every few tens of seconds. The gate decides which fixes
//! are significant enough to transmit so that the channel and the durable
//! store are not flooded with near-duplicate positions.
//!
//! # Policy
//!
//! ```text
//! no previous fix                              --> admit
//! elapsed >= min_interval AND moved >= min_distance --> admit
//! otherwise                                    --> reject
//! ```
//!
//! The predicate itself ([`SampleGate::admit`]) is pure. [`SampleGate::offer`]
//! wraps it and records the admitted fix, which is what the producer uses.

use std::time::Duration;

use tokio::time::Instant;

use crate::geo::{haversine_m, LatLng, PositionSample};

/// Default minimum time between admitted samples.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(8);

/// Default minimum movement between admitted samples, in metres.
pub const DEFAULT_MIN_DISTANCE_M: f64 = 25.0;

/// Gate thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Minimum time since the last admitted sample.
    pub min_interval: Duration,
    /// Minimum great-circle movement since the last admitted sample, in metres.
    pub min_distance_m: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

impl GateConfig {
    /// Set the minimum interval.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set the minimum distance in metres.
    pub fn with_min_distance_m(mut self, metres: f64) -> Self {
        self.min_distance_m = metres;
        self
    }
}

/// The last fix that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmittedFix {
    pub point: LatLng,
    pub at: Instant,
}

/// Admission gate for raw position samples.
#[derive(Debug, Clone)]
pub struct SampleGate {
    config: GateConfig,
    last: Option<AdmittedFix>,
}

impl Default for SampleGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl SampleGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config, last: None }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide whether `sample` should be transmitted given the last admitted fix.
    ///
    /// Pure: does not record anything.
    pub fn admit(
        &self,
        sample: &PositionSample,
        last: Option<&AdmittedFix>,
        now: Instant,
    ) -> bool {
        let Some(last) = last else {
            return true;
        };

        let elapsed = now.saturating_duration_since(last.at);
        if elapsed < self.config.min_interval {
            return false;
        }

        haversine_m(last.point, sample.point()) >= self.config.min_distance_m
    }

    /// Run the predicate against the recorded fix and record the sample if admitted.
    pub fn offer(&mut self, sample: &PositionSample, now: Instant) -> bool {
        let admitted = self.admit(sample, self.last.as_ref(), now);
        if admitted {
            self.last = Some(AdmittedFix {
                point: sample.point(),
                at: now,
            });
        }
        admitted
    }

    /// Record a fix that was sent without going through the gate (simulation).
    pub fn record(&mut self, point: LatLng, at: Instant) {
        self.last = Some(AdmittedFix { point, at });
    }

    /// The last admitted fix, if any.
    pub fn last_admitted(&self) -> Option<&AdmittedFix> {
        self.last.as_ref()
    }

    /// Distance in metres from the last admitted fix, or `None` before the first fix.
    pub fn distance_from_last_m(&self, sample: &PositionSample) -> Option<f64> {
        self.last.map(|last| haversine_m(last.point, sample.point()))
    }

    /// Forget the last admitted fix; the next sample is admitted unconditionally.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(lat: f64, lng: f64) -> PositionSample {
        PositionSample::now(lat, lng, None).unwrap()
    }

    /// Roughly 0.001° of latitude is 111 m.
    const STEP_111M: f64 = 0.001;

    #[test]
    fn test_default_thresholds() {
        let config = GateConfig::default();
        assert_eq!(config.min_interval, Duration::from_secs(8));
        assert_eq!(config.min_distance_m, 25.0);
    }

    #[test]
    fn test_first_sample_always_admitted() {
        let gate = SampleGate::default();
        assert!(gate.admit(&sample(-1.3, 36.8), None, Instant::now()));
    }

    #[test]
    fn test_rejects_before_interval_even_when_moved() {
        let mut gate = SampleGate::default();
        let t0 = Instant::now();
        assert!(gate.offer(&sample(-1.3, 36.8), t0));
        assert!(!gate.offer(
            &sample(-1.3 + STEP_111M, 36.8),
            t0 + Duration::from_secs(3)
        ));
    }

    #[test]
    fn test_rejects_small_movement_after_interval() {
        let mut gate = SampleGate::default();
        let t0 = Instant::now();
        assert!(gate.offer(&sample(-1.3, 36.8), t0));
        // ~11 m
        assert!(!gate.offer(
            &sample(-1.3 + 0.0001, 36.8),
            t0 + Duration::from_secs(30)
        ));
    }

    #[test]
    fn test_admits_when_both_thresholds_met() {
        let mut gate = SampleGate::default();
        let t0 = Instant::now();
        assert!(gate.offer(&sample(-1.3, 36.8), t0));
        assert!(gate.offer(
            &sample(-1.3 + STEP_111M, 36.8),
            t0 + Duration::from_secs(8)
        ));
    }

    #[test]
    fn test_rejected_sample_does_not_move_reference() {
        let mut gate = SampleGate::default();
        let t0 = Instant::now();
        gate.offer(&sample(0.0, 0.0), t0);
        gate.offer(&sample(0.0001, 0.0), t0 + Duration::from_secs(10));

        let last = gate.last_admitted().unwrap();
        assert_eq!(last.point, LatLng::new(0.0, 0.0));
        assert_eq!(last.at, t0);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = GateConfig::default()
            .with_min_interval(Duration::ZERO)
            .with_min_distance_m(0.0);
        let mut gate = SampleGate::new(config);
        let t0 = Instant::now();
        assert!(gate.offer(&sample(0.0, 0.0), t0));
        assert!(gate.offer(&sample(0.0, 0.0), t0));
    }

    #[test]
    fn test_reset_readmits_immediately() {
        let mut gate = SampleGate::default();
        let t0 = Instant::now();
        gate.offer(&sample(0.0, 0.0), t0);
        gate.reset();
        assert!(gate.offer(&sample(0.0, 0.0), t0));
    }

    #[test]
    fn test_distance_from_last() {
        let mut gate = SampleGate::default();
        assert!(gate.distance_from_last_m(&sample(0.0, 0.0)).is_none());
        gate.offer(&sample(0.0, 0.0), Instant::now());
        let d = gate.distance_from_last_m(&sample(STEP_111M, 0.0)).unwrap();
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }

    proptest! {
        #[test]
        fn prop_admitted_pairs_respect_both_thresholds(
            steps in prop::collection::vec((0u64..20_000, -0.0005f64..0.0005, -0.0005f64..0.0005), 1..60)
        ) {
            let mut gate = SampleGate::default();
            let start = Instant::now();
            let mut elapsed_ms = 0u64;
            let (mut lat, mut lng) = (-1.3f64, 36.8f64);
            let mut admitted: Vec<AdmittedFix> = Vec::new();

            for (dt, dlat, dlng) in steps {
                elapsed_ms += dt;
                lat += dlat;
                lng += dlng;
                let now = start + Duration::from_millis(elapsed_ms);
                let s = sample(lat, lng);
                if gate.offer(&s, now) {
                    admitted.push(AdmittedFix { point: s.point(), at: now });
                }
            }

            prop_assert!(!admitted.is_empty());
            for pair in admitted.windows(2) {
                let dt = pair[1].at.duration_since(pair[0].at);
                let dist = haversine_m(pair[0].point, pair[1].point);
                prop_assert!(dt >= DEFAULT_MIN_INTERVAL);
                prop_assert!(dist >= DEFAULT_MIN_DISTANCE_M);
            }
        }
    }
}
