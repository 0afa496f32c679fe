//! # Exponential Backoff Retry
//!
//! Retry policy for establishing coordination sessions. The sleep before
//! retry `n` (zero based) is `base_sleep * max(1, random in [0, 2^(n+1)))`,
//! capped at `max_sleep`. Randomising the multiplier spreads reconnect storms
//! when a whole fleet loses the ensemble at once.

use crate::constants::retry::MAX_RETRIES_LIMIT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Exponential backoff with a bounded number of retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExponentialBackoffRetry {
    base_sleep: Duration,
    max_retries: u32,
    max_sleep: Duration,
}

impl ExponentialBackoffRetry {
    /// Create a policy; `max_retries` above the supported limit is clamped
    pub fn new(base_sleep: Duration, max_retries: u32, max_sleep: Duration) -> Self {
        let max_retries = if max_retries > MAX_RETRIES_LIMIT {
            warn!(
                requested = max_retries,
                limit = MAX_RETRIES_LIMIT,
                "max_retries too large, clamping"
            );
            MAX_RETRIES_LIMIT
        } else {
            max_retries
        };
        Self {
            base_sleep,
            max_retries,
            max_sleep,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another attempt is allowed after `retry_count` retries
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Sleep before retry number `retry_count`
    pub fn sleep_time(&self, retry_count: u32) -> Duration {
        let shift = retry_count.min(MAX_RETRIES_LIMIT) + 1;
        let multiplier = fastrand::u32(0..(1u32 << shift)).max(1);
        self.base_sleep
            .saturating_mul(multiplier)
            .min(self.max_sleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamps_max_retries() {
        let policy =
            ExponentialBackoffRetry::new(Duration::from_millis(10), 100, Duration::from_secs(1));
        assert_eq!(policy.max_retries(), MAX_RETRIES_LIMIT);
    }

    #[test]
    fn test_allows_retry_until_budget_spent() {
        let policy =
            ExponentialBackoffRetry::new(Duration::from_millis(10), 2, Duration::from_secs(1));
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
    }

    #[test]
    fn test_first_retry_sleeps_exactly_base() {
        let policy =
            ExponentialBackoffRetry::new(Duration::from_millis(100), 3, Duration::from_secs(10));
        for _ in 0..50 {
            assert_eq!(policy.sleep_time(0), Duration::from_millis(100));
        }
    }

    proptest! {
        #[test]
        fn prop_sleep_is_bounded(
            base_ms in 1u64..1_000,
            max_ms in 1u64..60_000,
            retry in 0u32..40,
        ) {
            let policy = ExponentialBackoffRetry::new(
                Duration::from_millis(base_ms),
                MAX_RETRIES_LIMIT,
                Duration::from_millis(max_ms),
            );
            let sleep = policy.sleep_time(retry);
            prop_assert!(sleep <= Duration::from_millis(max_ms));
            prop_assert!(sleep >= Duration::from_millis(base_ms.min(max_ms)));
            let ceiling = Duration::from_millis(base_ms)
                .saturating_mul(1u32 << (retry.min(MAX_RETRIES_LIMIT) + 1));
            prop_assert!(sleep <= ceiling);
        }
    }
}
