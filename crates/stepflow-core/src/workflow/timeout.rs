//! Time-bounded execution of an inner step.

use std::time::Duration;

use super::context::WorkflowContext;
use super::error::StepError;
use super::step::{BoxStep, Step};

/// Races the inner step against a fixed limit.
///
/// The inner step runs on a child-cancellation view of the context, which is
/// cancelled when the limit elapses. Outer cancellation wins over the clock.
pub struct TimeoutStep {
    name: String,
    inner: BoxStep,
    limit: Duration,
}

impl TimeoutStep {
    pub fn new(name: impl Into<String>, inner: BoxStep, limit: Duration) -> Self {
        Self {
            name: name.into(),
            inner,
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl Step for TimeoutStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let view = ctx.with_child_cancellation();

        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                view.cancel();
                Err(StepError::Cancelled)
            }
            result = self.inner.execute(&view) => result,
            _ = tokio::time::sleep(self.limit) => {
                view.cancel();
                tracing::debug!(
                    step = self.name.as_str(),
                    inner = self.inner.name(),
                    limit_ms = self.limit.as_millis() as u64,
                    "inner step timed out"
                );
                Err(StepError::Timeout {
                    step: self.inner.name().to_string(),
                    limit: self.limit,
                })
            }
        }
    }
}
