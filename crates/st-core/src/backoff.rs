//! Capped exponential backoff with proportional jitter.
//!
//! The delay for exponent `n` is `min(base * 2^n, max)`, plus a random
//! extra of up to `max_jitter` times that delay.

use std::time::Duration;

use rand::Rng;

/// Backoff policy shared by queue delivery and local file retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for exponent 0.
    pub base: Duration,
    /// Cap applied before jitter.
    pub max: Duration,
    /// Upper bound of the jitter, as a fraction of the capped delay.
    pub max_jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::delivery()
    }
}

impl BackoffPolicy {
    /// Queue delivery retries: 1s doubling up to 60s, plus up to 25%.
    #[must_use]
    pub const fn delivery() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_jitter: 0.25,
        }
    }

    /// Transient file IO retries: 100ms doubling, plus up to 30%.
    #[must_use]
    pub const fn file_io() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
            max_jitter: 0.30,
        }
    }

    #[must_use]
    pub const fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    #[must_use]
    pub const fn with_max_jitter(mut self, max_jitter: f64) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Capped delay for `exponent`, without jitter.
    #[must_use]
    pub fn base_delay(&self, exponent: u32) -> Duration {
        let factor = 1u32 << exponent.min(20);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for `exponent` with a caller-chosen jitter fraction.
    ///
    /// The fraction is clamped to `[0, max_jitter]`.
    #[must_use]
    pub fn delay_with(&self, exponent: u32, jitter_fraction: f64) -> Duration {
        let base = self.base_delay(exponent);
        let fraction = jitter_fraction.clamp(0.0, self.max_jitter.max(0.0));
        base + base.mul_f64(fraction)
    }

    /// Delay for `exponent` with random jitter.
    #[must_use]
    pub fn delay(&self, exponent: u32) -> Duration {
        let upper = self.max_jitter.max(0.0);
        let fraction = if upper > 0.0 {
            rand::thread_rng().gen_range(0.0..=upper)
        } else {
            0.0
        };
        self.delay_with(exponent, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_delays_double_until_cap() {
        let policy = BackoffPolicy::delivery();
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(3), Duration::from_secs(8));
        assert_eq!(policy.base_delay(5), Duration::from_secs(32));
        assert_eq!(policy.base_delay(6), Duration::from_secs(60));
        assert_eq!(policy.base_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_is_clamped() {
        let policy = BackoffPolicy::delivery();
        assert_eq!(policy.delay_with(2, 0.0), Duration::from_secs(4));
        assert_eq!(policy.delay_with(2, 0.25), Duration::from_secs(5));
        assert_eq!(policy.delay_with(2, 3.0), Duration::from_secs(5));
        assert_eq!(policy.delay_with(2, -1.0), Duration::from_secs(4));
    }

    #[test]
    fn test_random_delays_stay_within_bounds() {
        let policy = BackoffPolicy::delivery();
        for attempt in 1..12 {
            let floor = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay <= Duration::from_secs(75), "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_file_io_policy_starts_at_100ms() {
        let policy = BackoffPolicy::file_io();
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(400));
        assert!(policy.delay(2) <= Duration::from_millis(521));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::delivery().with_max_jitter(0.0);
        assert_eq!(policy.delay(4), Duration::from_secs(16));
    }
}
