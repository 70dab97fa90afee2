//! Exponential reconnect backoff.

use std::time::Duration;

/// Default delay before the first reconnect.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Default ceiling for the reconnect delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(10_000);

/// `delay(retry) = min(max, base * 2^retry)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay to wait before reconnect attempt number `retry + 1`.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u128> = (0..7).map(|r| policy.delay(r).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000, 10000, 10000]);
    }

    #[test]
    fn test_huge_retry_counts_saturate_at_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(31), DEFAULT_BACKOFF_MAX);
        assert_eq!(policy.delay(32), DEFAULT_BACKOFF_MAX);
        assert_eq!(policy.delay(u32::MAX), DEFAULT_BACKOFF_MAX);
    }

    #[test]
    fn test_sequence_is_non_decreasing() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(30));
        let mut previous = Duration::ZERO;
        for retry in 0..64 {
            let delay = policy.delay(retry);
            assert!(delay >= previous);
            assert!(delay <= policy.max);
            previous = delay;
        }
    }
}
