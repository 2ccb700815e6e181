// Retry policy for transient persistence failures.
//
//   attempt 1 fails → wait base
//   attempt 2 fails → wait base * 2
//   ...             → capped at max_delay
//   attempt max_attempts fails → give up (FailedPermanent)

use std::time::Duration;

const BASE_DELAY_MS: u64 = 2_000;
const MAX_DELAY_MS: u64 = 60_000;
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first, before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(BASE_DELAY_MS),
            Duration::from_millis(MAX_DELAY_MS),
            MAX_ATTEMPTS,
        )
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Compute exponential backoff delay for a given retry number (0-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = retry.min(16); // cap exponent to avoid overflow
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(1u64 << exp).min(max_ms))
    }

    /// Whether another attempt is allowed after `failed_attempts` failures.
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }
}
