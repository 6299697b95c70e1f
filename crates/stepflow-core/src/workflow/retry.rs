//! Bounded re-invocation of a body step.
//!
//! Attempts run back to back unless a [`RetryPolicy`] is attached, in which
//! case the policy's exponential delay separates them. Cancellation is never
//! retried and interrupts an in-progress delay.

use std::time::Duration;

use serde_json::json;

use super::context::WorkflowContext;
use super::error::StepError;
use super::step::{BoxStep, Step};

/// Property holding the 1-based attempt number of the running `RetryStep`.
pub const RETRY_ATTEMPT: &str = "Retry.Attempt";

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Exponential delay between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt numbered `retry` (0-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(retry as i32);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

// ---------------------------------------------------------------------------
// RetryStep
// ---------------------------------------------------------------------------

pub struct RetryStep {
    name: String,
    body: BoxStep,
    max_attempts: u32,
    policy: Option<RetryPolicy>,
}

impl RetryStep {
    /// Retry `body` up to `max_attempts` times in total. Zero is treated as one.
    pub fn new(name: impl Into<String>, body: BoxStep, max_attempts: u32) -> Self {
        Self {
            name: name.into(),
            body,
            max_attempts: max_attempts.max(1),
            policy: None,
        }
    }

    /// Wait between attempts according to `policy`.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Step for RetryStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let mut attempt: u32 = 1;
        loop {
            ctx.set(RETRY_ATTEMPT, json!(attempt));

            let error = match self.body.execute(ctx).await {
                Ok(()) => return Ok(()),
                Err(StepError::Cancelled) => return Err(StepError::Cancelled),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                tracing::debug!(
                    step = self.name.as_str(),
                    attempts = attempt,
                    error = %error,
                    "retry attempts exhausted"
                );
                return Err(error);
            }

            tracing::debug!(
                step = self.name.as_str(),
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "attempt failed, retrying"
            );

            if let Some(policy) = &self.policy {
                let delay = policy.delay_for_attempt(attempt - 1);
                tokio::select! {
                    _ = ctx.cancellation().cancelled() => return Err(StepError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                ctx.check_cancelled()?;
            }

            attempt += 1;
        }
    }
}
