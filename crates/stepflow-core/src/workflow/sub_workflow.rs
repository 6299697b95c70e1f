//! Nested workflow execution against the parent context.
//!
//! The nested engine sees the same properties, errors, abort flag and
//! cancellation token as the parent. A nested run that does not complete
//! sets the parent's abort flag instead of failing the step, so the parent
//! stops at its next check without compensating.

use std::sync::Arc;

use stepflow_types::workflow::WorkflowStatus;

use super::context::WorkflowContext;
use super::engine::WorkflowEngine;
use super::error::StepError;
use super::step::Step;

pub struct SubWorkflowStep {
    name: String,
    engine: Arc<WorkflowEngine>,
}

impl SubWorkflowStep {
    pub fn new(name: impl Into<String>, engine: Arc<WorkflowEngine>) -> Self {
        Self {
            name: name.into(),
            engine,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }
}

impl Step for SubWorkflowStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let parent_step = ctx.current_step();
        let outcome = self.engine.execute(ctx.clone()).await;

        // The nested loop moved the step cursor; put the parent's back.
        if let Some(step) = &parent_step {
            ctx.set_current_step(&step.name, step.index);
        }

        let result = outcome.map_err(|e| StepError::Other(anyhow::Error::new(e)))?;
        match result.status {
            WorkflowStatus::Completed => Ok(()),
            WorkflowStatus::Aborted if ctx.is_cancelled() => Err(StepError::Cancelled),
            status => {
                tracing::info!(
                    step = self.name.as_str(),
                    workflow = self.engine.name(),
                    %status,
                    "sub-workflow did not complete, aborting parent"
                );
                ctx.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::error::EngineError;
    use crate::workflow::observer::{ObserverResult, WorkflowObserver};
    use crate::workflow::step::BoxStep;
    use crate::workflow::test_support::{Journal, failing, journal_step};
    use serde_json::json;
    use stepflow_types::config::EngineConfig;

    fn nested(steps: Vec<BoxStep>) -> Arc<WorkflowEngine> {
        Arc::new(
            WorkflowEngine::new("nested", steps, vec![], vec![], EngineConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn nested_success_shares_properties() {
        let journal = Journal::default();
        let step = SubWorkflowStep::new("child", nested(vec![journal_step("inner", &journal)]));
        let ctx = WorkflowContext::new();
        ctx.set_current_step("child", 4);

        step.execute(&ctx).await.unwrap();

        assert_eq!(ctx.get("inner"), Some(json!(true)));
        assert!(!ctx.is_aborted());
        assert_eq!(ctx.current_step_name().as_deref(), Some("child"));
        assert_eq!(ctx.current_step_index(), Some(4));
    }

    #[tokio::test]
    async fn nested_fault_aborts_parent_instead_of_failing() {
        let step = SubWorkflowStep::new("child", nested(vec![failing("inner", "boom")]));
        let ctx = WorkflowContext::new();

        step.execute(&ctx).await.unwrap();

        assert!(ctx.is_aborted());
        assert_eq!(ctx.error_count(), 1);
    }

    #[tokio::test]
    async fn nested_cancellation_returns_cancelled() {
        let step = SubWorkflowStep::new("child", nested(vec![failing("never", "unreachable")]));
        let ctx = WorkflowContext::new();
        ctx.cancel();

        let err = step.execute(&ctx).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(!ctx.is_aborted());
    }

    #[tokio::test]
    async fn nested_observer_error_becomes_fault() {
        struct Broken;
        impl WorkflowObserver for Broken {
            fn on_workflow_started(&self, _ctx: &WorkflowContext, _workflow: &str) -> ObserverResult {
                Err(anyhow::anyhow!("observer down"))
            }
        }

        let engine = WorkflowEngine::new(
            "nested",
            vec![],
            vec![],
            vec![Arc::new(Broken)],
            EngineConfig::default(),
        )
        .unwrap();
        let step = SubWorkflowStep::new("child", Arc::new(engine));

        let err = step.execute(&WorkflowContext::new()).await.unwrap_err();

        assert!(err.is::<EngineError>());
    }

    #[tokio::test]
    async fn parent_engine_stops_after_aborting_sub_workflow() {
        let journal = Journal::default();
        let parent = WorkflowEngine::new(
            "parent",
            vec![
                BoxStep::new(SubWorkflowStep::new("child", nested(vec![failing("inner", "boom")]))),
                journal_step("after", &journal),
            ],
            vec![],
            vec![],
            EngineConfig::with_compensation(),
        )
        .unwrap();

        let result = parent.execute(WorkflowContext::new()).await.unwrap();

        assert_eq!(result.status, WorkflowStatus::Aborted);
        assert!(journal.entries().is_empty());
    }
}
