//! Retry decisions for failed source queries.

use std::time::Duration;

use leadscout_shared::{ErrorKind, RunConfig};

/// What to do after a failed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Query again after waiting this long (on top of the normal pacing).
    RetryAfter(Duration),
    GiveUp,
}

/// Retry rules keyed by error kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Seconds.
    pub backoff_base: f64,
    /// Seconds.
    pub backoff_max: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: f64, backoff_max: f64) -> Self {
        Self {
            max_retries,
            backoff_base,
            backoff_max,
        }
    }

    /// Decide after `attempt` attempts (at least 1) have failed with `kind`.
    ///
    /// Access-denied waits `backoff_base * 2^(attempt-1)` capped at
    /// `backoff_max`. Timeouts and network errors retry with no extra wait.
    /// Structural errors are never retried.
    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        let attempt = attempt.max(1);
        match kind {
            ErrorKind::Structural => RetryDecision::GiveUp,
            _ if attempt > self.max_retries => RetryDecision::GiveUp,
            ErrorKind::AccessDenied => RetryDecision::RetryAfter(self.backoff(attempt)),
            ErrorKind::Timeout | ErrorKind::Network => RetryDecision::RetryAfter(Duration::ZERO),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        // 2^62 seconds is far past any sane cap; clamp the exponent so powi stays finite.
        let exp = (attempt - 1).min(62) as i32;
        let secs = (self.backoff_base * 2f64.powi(exp)).min(self.backoff_max);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl From<&RunConfig> for RetryPolicy {
    fn from(config: &RunConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base, config.backoff_max)
    }
}
