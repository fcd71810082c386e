//! Retry and backoff policy.
//!
//! [`RetryConfig`] drives both request-level retries in the HTTP transport
//! (publish, stream connect) and reconnection in the event runner.
//!
//! # Example
//!
//! ```rust
//! use event_replication::resilience::RetryConfig;
//! use std::time::Duration;
//!
//! let retry = RetryConfig {
//!     initial_delay: Duration::from_millis(10),
//!     ..RetryConfig::default()
//! };
//! assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(10));
//! assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(20));
//! ```

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    /// Set to `usize::MAX` for infinite retries.
    pub max_attempts: usize,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,

    /// Timeout for each individual attempt (HTTP connect and response headers).
    pub connection_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        // Clamp the exponent so huge attempt counts don't overflow to inf
        let exponent = (attempt - 1).min(i32::MAX as usize) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        std::cmp::min(Duration::from_secs_f64(delay_secs.max(0.0)), self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn allows_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}
