//! Retry policy: backoff delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff parameters.
///
/// The delay before attempt `n` is zero for the first attempt and
/// `base^(n-1) * unit` afterwards, optionally capped at `max_delay_ms`.
/// With the defaults (base 5, unit 1s) attempts 1..=5 are delayed by
/// 0s, 5s, 25s, 125s and 625s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base: u32,
    pub unit_ms: u64,
    pub max_delay_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: 5,
            unit_ms: 1_000,
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: u32, unit: Duration) -> Self {
        Self {
            base,
            unit_ms: u64::try_from(unit.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Delay inserted before `attempt` (1-indexed).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = u64::from(self.base).saturating_pow(attempt - 1);
        let mut ms = self.unit_ms.saturating_mul(factor);
        if let Some(cap) = self.max_delay_ms {
            ms = ms.min(cap);
        }
        Duration::from_millis(ms)
    }

    /// Delay before retrying after `failed_attempt` failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.delay_before(failed_attempt.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_policy_matches_webhook_schedule() {
        let policy = RetryPolicy::default();

        let delays: Vec<u128> = (1..=4).map(|a| policy.delay_before(a).as_millis()).collect();
        assert_eq!(delays, vec![0, 5_000, 25_000, 125_000]);
        assert_eq!(policy.delay_before(5), Duration::from_secs(625));
    }

    #[test]
    fn delay_after_is_base_to_the_failed_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after(3), Duration::from_secs(125));
    }

    #[test]
    fn ceiling_caps_delay() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1)).with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.delay_before(4), Duration::from_secs(8));
        assert_eq!(policy.delay_before(5), Duration::from_secs(10));
        assert_eq!(policy.delay_before(40), Duration::from_secs(10));
    }

    #[test]
    fn huge_attempts_saturate_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(u32::MAX), Duration::from_millis(u64::MAX));
    }

    proptest! {
        #[test]
        fn delays_are_non_decreasing(base in 1u32..10, unit_ms in 1u64..5_000, attempt in 1u32..30) {
            let policy = RetryPolicy { base, unit_ms, max_delay_ms: None };
            prop_assert!(policy.delay_before(attempt) <= policy.delay_before(attempt + 1));
        }

        #[test]
        fn first_attempt_is_never_delayed(base in 0u32..100, unit_ms in 0u64..100_000) {
            let policy = RetryPolicy { base, unit_ms, max_delay_ms: None };
            prop_assert_eq!(policy.delay_before(1), Duration::ZERO);
        }
    }
}
