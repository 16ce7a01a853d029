use rand::{rng, Rng};
use std::time::Duration;

/// Retry schedule with linear backoff and jitter.
///
/// `max_retries = None` retries forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: Option<usize>,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(None, 200, 5_000)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: Option<usize>, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        let base_backoff_ms = if base_backoff_ms == 0 {
            200
        } else {
            base_backoff_ms
        };
        Self {
            max_retries,
            base_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(base_backoff_ms),
        }
    }

    pub fn max_retries(&self) -> Option<usize> {
        self.max_retries
    }

    /// Whether another attempt is allowed after `attempt` failed attempts.
    pub fn should_retry(&self, attempt: usize) -> bool {
        match self.max_retries {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Linear backoff with jitter: base * attempt, capped at max, scaled to 50-100%.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let linear = self
            .base_backoff_ms
            .saturating_mul(attempt.max(1) as u64);
        let backoff = linear.min(self.max_backoff_ms);
        let jitter = rng().random_range(backoff / 2..=backoff);
        Duration::from_millis(jitter)
    }
}
