//! Decision model: what happens to a job after a failed attempt.

use std::time::Duration;

use super::errors::ClassifiedError;
use super::retry::RetryPolicy;

/// The next step for a job whose attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Re-enqueue the job, due after `delay`.
    Retry { delay: Duration, reason: String },

    /// Route the job to the dead-letter sink.
    DeadLetter { reason: String },
}

impl Decision {
    pub fn will_retry(&self) -> bool {
        matches!(self, Decision::Retry { .. })
    }
}

/// Pure decision function over (classification, attempt, ceiling).
///
/// No I/O and no state: the worker applies the returned decision through the
/// job store.
pub trait Decider: Send + Sync {
    fn decide(&self, error: &ClassifiedError, attempt: u32, max_attempts: u32) -> Decision;
}

/// Class-aware decider with exponential backoff.
///
/// - Non-retryable classes dead-letter immediately, whatever the attempt.
/// - Retryable classes retry until `attempt >= max_attempts`.
/// - A `retry_after` hint raises the backoff delay, never lowers it.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, error: &ClassifiedError, attempt: u32, max_attempts: u32) -> Decision {
        if !error.class.is_retryable() {
            return Decision::DeadLetter {
                reason: format!("non-retryable {} on attempt {attempt}", error.class),
            };
        }
        if attempt >= max_attempts {
            return Decision::DeadLetter {
                reason: format!("max attempts reached: {attempt}/{max_attempts}"),
            };
        }

        let mut delay = self.retry_policy.delay_after(attempt);
        if let Some(hint) = error.retry_after() {
            delay = delay.max(hint);
        }
        Decision::Retry {
            delay,
            reason: format!(
                "{} on attempt {attempt}/{max_attempts}, retrying in {delay:?}",
                error.class
            ),
        }
    }
}
