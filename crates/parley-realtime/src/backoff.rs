//! Reconnect policy: bounded exponential backoff without jitter.

use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Whether another resubscribe is allowed after `attempts` retries.
pub fn should_retry(attempts: u32, max_retries: u32) -> bool {
    attempts < max_retries
}

/// `base_delay * 2^attempts`, saturating instead of overflowing.
pub fn delay_for(attempts: u32, base_delay: Duration) -> Duration {
    base_delay.saturating_mul(2u32.saturating_pow(attempts))
}

/// Retry ceiling and backoff base for one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// The delay before the next resubscribe, or `None` once retries are spent.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        should_retry(attempts, self.max_retries).then(|| delay_for(attempts, self.base_delay))
    }
}
