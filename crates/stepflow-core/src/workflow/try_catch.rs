//! Try/Catch/Finally around a body step.
//!
//! Catch clauses are tested in declaration order and the first match handles
//! the fault. Cancellation is never offered to a handler. Finally runs exactly
//! once on every path, and an error from Finally replaces any other outcome.

use serde_json::json;

use super::context::WorkflowContext;
use super::error::StepError;
use super::step::{BoxStep, Step};

/// Property holding the message of the fault being handled.
pub const TRY_CATCH_ERROR: &str = "TryCatch.Error";

type Matcher = Box<dyn Fn(&StepError) -> bool + Send + Sync>;

struct CatchClause {
    matcher: Matcher,
    handler: BoxStep,
}

pub struct TryCatchStep {
    name: String,
    body: BoxStep,
    catches: Vec<CatchClause>,
    finally: Option<BoxStep>,
}

impl TryCatchStep {
    pub fn new(name: impl Into<String>, body: BoxStep) -> Self {
        Self {
            name: name.into(),
            body,
            catches: Vec::new(),
            finally: None,
        }
    }

    /// Handle faults that are, or wrap, an `E`.
    ///
    /// `catch::<StepError>` handles every fault.
    pub fn catch<E>(mut self, handler: BoxStep) -> Self
    where
        E: std::error::Error + 'static,
    {
        self.catches.push(CatchClause {
            matcher: Box::new(|error: &StepError| error.is::<E>()),
            handler,
        });
        self
    }

    /// Handle faults accepted by `predicate`.
    pub fn catch_when<P>(mut self, predicate: P, handler: BoxStep) -> Self
    where
        P: Fn(&StepError) -> bool + Send + Sync + 'static,
    {
        self.catches.push(CatchClause {
            matcher: Box::new(predicate),
            handler,
        });
        self
    }

    pub fn finally(mut self, step: BoxStep) -> Self {
        self.finally = Some(step);
        self
    }

    async fn run_guarded(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let error = match self.body.execute(ctx).await {
            Ok(()) => return Ok(()),
            Err(StepError::Cancelled) => return Err(StepError::Cancelled),
            Err(e) => e,
        };

        let Some(clause) = self.catches.iter().find(|c| (c.matcher)(&error)) else {
            return Err(error);
        };

        tracing::debug!(
            step = self.name.as_str(),
            handler = clause.handler.name(),
            error = %error,
            "fault caught"
        );
        ctx.set(TRY_CATCH_ERROR, json!(error.to_string()));
        clause.handler.execute(ctx).await
    }
}

impl Step for TryCatchStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let outcome = self.run_guarded(ctx).await;

        if let Some(finally) = &self.finally {
            finally.execute(ctx).await?;
        }
        outcome
    }
}
