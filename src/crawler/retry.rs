//! Retry policy for failed fetches
//!
//! The policy is a pure function of the attempt count and the error class; the
//! worker pool owns the timers.

use crate::config::CrawlerConfig;
use std::time::Duration;

/// Whether a failure may succeed if tried again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

/// What to do with a failed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Fetch again after the delay
    Retry(Duration),

    /// Give up and record the failure
    Abandon,
}

/// Exponential backoff policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed for transient failures
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    /// Decides the fate of an item that has failed `attempt` times before this failure
    ///
    /// `attempt` starts at 0, so with `max_retries = 3` the delays are
    /// `base, 2 * base, 4 * base` and the fourth failure is abandoned.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        match class {
            ErrorClass::Permanent => RetryDecision::Abandon,
            ErrorClass::Transient if attempt >= self.max_retries => RetryDecision::Abandon,
            ErrorClass::Transient => RetryDecision::Retry(self.delay_for(attempt)),
        }
    }

    /// Backoff delay for a given attempt, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
