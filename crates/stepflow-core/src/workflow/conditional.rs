//! If/Then/Else branching.

use std::sync::Arc;

use super::context::WorkflowContext;
use super::error::StepError;
use super::step::{BoxStep, Step};

/// Synchronous predicate over the context, shared by branches and loops.
pub type Predicate = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;

/// Runs `then` when the predicate holds, otherwise `otherwise` if present.
///
/// The predicate is evaluated exactly once per execution.
pub struct ConditionalStep {
    name: String,
    predicate: Predicate,
    then: BoxStep,
    otherwise: Option<BoxStep>,
}

impl ConditionalStep {
    pub fn new<P>(name: impl Into<String>, predicate: P, then: BoxStep) -> Self
    where
        P: Fn(&WorkflowContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            then,
            otherwise: None,
        }
    }

    /// Attach an else branch.
    pub fn with_else(mut self, otherwise: BoxStep) -> Self {
        self.otherwise = Some(otherwise);
        self
    }
}

impl Step for ConditionalStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let branch = if (self.predicate)(ctx) {
            Some(&self.then)
        } else {
            self.otherwise.as_ref()
        };

        match branch {
            Some(step) => {
                tracing::debug!(
                    conditional = self.name.as_str(),
                    branch = step.name(),
                    "branch selected"
                );
                step.execute(ctx).await
            }
            None => Ok(()),
        }
    }
}
