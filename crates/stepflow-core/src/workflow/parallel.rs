//! Concurrent fan-out over independent branches.
//!
//! Each branch runs as its own tokio task in a `JoinSet`, holding a clone of
//! the context handle. All branches see the same properties; concurrent
//! writes to one key are last-writer-wins.
//!
//! # Failure contract
//!
//! - Default: wait for every branch, then surface the error of the
//!   lowest-indexed failed branch.
//! - Any branch returning `Cancelled` makes the whole step `Cancelled`.
//! - `fail_fast(true)`: abort the remaining branches on the first failure and
//!   return it immediately.
//! - A panicking branch surfaces as `StepError::Panicked`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{Id, JoinError, JoinSet};

use super::context::WorkflowContext;
use super::error::StepError;
use super::step::{BoxStep, Step};

pub struct ParallelStep {
    name: String,
    branches: Vec<Arc<BoxStep>>,
    fail_fast: bool,
}

impl ParallelStep {
    pub fn new(name: impl Into<String>, branches: Vec<BoxStep>) -> Self {
        Self {
            name: name.into(),
            branches: branches.into_iter().map(Arc::new).collect(),
            fail_fast: false,
        }
    }

    /// Stop at the first failed branch instead of waiting for all of them.
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    fn join_failure(&self, index: usize, error: JoinError) -> StepError {
        let step = self.branches[index].name().to_string();
        if !error.is_panic() {
            return StepError::Cancelled;
        }
        let payload = error.into_panic();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        StepError::Panicked { step, message }
    }
}

impl Step for ParallelStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        if self.branches.is_empty() {
            return Ok(());
        }

        let mut join_set = JoinSet::new();
        let mut task_index: HashMap<Id, usize> = HashMap::with_capacity(self.branches.len());

        for (index, branch) in self.branches.iter().enumerate() {
            let branch = Arc::clone(branch);
            let branch_ctx = ctx.clone();
            let handle = join_set.spawn(async move { branch.execute(&branch_ctx).await });
            task_index.insert(handle.id(), index);
        }

        tracing::debug!(
            parallel = self.name.as_str(),
            branches = self.branches.len(),
            fail_fast = self.fail_fast,
            "branches spawned"
        );

        let mut failures: Vec<(usize, StepError)> = Vec::new();

        while let Some(joined) = join_set.join_next_with_id().await {
            let (index, outcome) = match joined {
                Ok((id, outcome)) => (task_index[&id], outcome),
                Err(e) => {
                    let index = task_index[&e.id()];
                    (index, Err(self.join_failure(index, e)))
                }
            };

            if let Err(error) = outcome {
                tracing::debug!(
                    parallel = self.name.as_str(),
                    branch = self.branches[index].name(),
                    index,
                    error = %error,
                    "branch failed"
                );
                if self.fail_fast {
                    join_set.abort_all();
                    return Err(error);
                }
                failures.push((index, error));
            }
        }

        if failures.iter().any(|(_, e)| e.is_cancelled()) {
            return Err(StepError::Cancelled);
        }
        match failures.into_iter().min_by_key(|(index, _)| *index) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}
