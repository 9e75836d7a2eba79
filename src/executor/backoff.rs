//! Retry delay calculation.
//!
//! Exponential backoff doubles the base delay per attempt, adds up to 10%
//! random jitter to decorrelate concurrent retries, and clamps at the
//! configured maximum. Fixed backoff uses the base delay unchanged.

use crate::resilience::CircuitBreakerConfig;
use std::time::Duration;

/// Delay policy between retry attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    exponential: bool,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, exponential: bool) -> Self {
        Self {
            base_delay,
            max_delay,
            exponential,
        }
    }

    /// Build the policy from a circuit's retry settings
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.retry_base_delay,
            config.max_retry_delay,
            config.use_exponential_backoff,
        )
    }

    /// Delay before retry number `attempt` (0 is the first retry).
    ///
    /// Jitter is at most 10% of the undecayed exponential value, so delays
    /// never decrease across attempts until the cap flattens them.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(self.max_delay);
        }

        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(32) as i32);
        let jitter = fastrand::f64() * exponential * 0.1;
        Duration::from_secs_f64((exponential + jitter).min(self.max_delay.as_secs_f64()))
    }
}
