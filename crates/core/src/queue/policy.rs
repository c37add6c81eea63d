//! Retry policy.

use std::time::Duration;

use serde::Serialize;

use super::{QueueConfig, TriageJob};

/// What to do with a job whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Budget remains: roll back and run again after the delay.
    Retry(Duration),
    /// Budget spent: fail permanently.
    Exhausted,
}

/// Bounded exponential backoff.
///
/// `backoff(n)` is the delay after the n-th failed attempt:
/// `base * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Delay before the attempt following attempt number `attempts_made`.
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide the fate of a job whose current attempt failed.
    ///
    /// The job's own `max_attempts` is authoritative so a config change
    /// does not alter the budget of jobs already queued.
    pub fn decide(&self, job: &TriageJob) -> RetryDecision {
        if job.attempts_made < job.max_attempts {
            RetryDecision::Retry(self.backoff(job.attempts_made))
        } else {
            RetryDecision::Exhausted
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
