//! Retry policy and the stock retrying listener.

use super::failure::{FailureListener, TaskFailure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for automatic retries of failed tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial one.
    pub max_attempts: usize,
    /// Initial delay between attempts.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Whether to add jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disables jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculates the delay before the attempt following `attempt`
    /// (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% jitter.
            let jitter = capped * 0.25 * rand::random::<f64>();
            capped + jitter
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// A listener that retries failed tasks until the policy is exhausted.
///
/// Exhausted tasks are left unhandled, so their fate falls to the
/// environment's drop-failed-tasks policy.
#[derive(Debug, Default)]
pub struct RetryingListener {
    policy: RetryPolicy,
}

impl RetryingListener {
    /// Creates a retrying listener with the given policy.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl FailureListener for RetryingListener {
    async fn on_failure(&self, failure: &TaskFailure) {
        let attempt = failure.task().attempts();
        if attempt < self.policy.max_attempts {
            let delay = self.policy.delay_for_attempt(attempt.saturating_sub(1));
            debug!(
                task = %failure.task().label(),
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure.cause(),
                "retrying failed task"
            );
            tokio::time::sleep(delay).await;
            failure.retry().await;
        } else {
            warn!(
                task = %failure.task().label(),
                attempt = attempt,
                error = %failure.cause(),
                "retries exhausted"
            );
        }
    }
}
