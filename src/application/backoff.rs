//! Reconnect policy for the queue consumer.

use std::time::Duration;

use crate::config::BrokerConfig;

/// Bounded exponential backoff between broker connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.max_reconnect_attempts,
        )
    }

    /// Policy that never retries: the first failed connection is final.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0)
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Doubles per attempt starting from the initial delay, capped at the maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << shift)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures <= self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
