//! Shared fixtures for workflow unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use stepflow_types::workflow::WorkflowStatus;

use super::context::WorkflowContext;
use super::error::{StepError, WorkflowError};
use super::middleware::{Middleware, Next, StepInvocation};
use super::observer::{ObserverResult, WorkflowObserver};
use super::step::{BoxStep, FnStep};

/// Append-only record of what ran, shared across steps.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Step that journals its name and sets `ctx[name] = true`.
pub fn journal_step(name: &str, journal: &Journal) -> BoxStep {
    let journal = journal.clone();
    let label = name.to_string();
    BoxStep::new(FnStep::new(name, move |ctx: WorkflowContext| {
        let journal = journal.clone();
        let label = label.clone();
        async move {
            journal.push(label.clone());
            ctx.set(label, json!(true));
            Ok(())
        }
    }))
}

/// Compensating step that journals `name` and, on rollback, `undo:name`.
pub fn saga_step(name: &str, journal: &Journal, fail_rollback: bool) -> BoxStep {
    let run_journal = journal.clone();
    let undo_journal = journal.clone();
    let label = name.to_string();
    let undo_label = format!("undo:{name}");
    BoxStep::compensating(
        FnStep::new(name, move |_ctx: WorkflowContext| {
            let journal = run_journal.clone();
            let label = label.clone();
            async move {
                journal.push(label);
                Ok(())
            }
        })
        .with_compensation(move |_ctx: WorkflowContext| {
            let journal = undo_journal.clone();
            let label = undo_label.clone();
            async move {
                journal.push(label);
                if fail_rollback {
                    Err(StepError::failed("rollback failed"))
                } else {
                    Ok(())
                }
            }
        }),
    )
}

/// Step that always faults with `message`.
pub fn failing(name: &str, message: &str) -> BoxStep {
    let message = message.to_string();
    BoxStep::new(FnStep::new(name, move |_ctx: WorkflowContext| {
        let message = message.clone();
        async move { Err(StepError::failed(message)) }
    }))
}

/// Step that counts its invocations at `ctx[key]` and faults until the count
/// reaches `succeed_on`.
pub fn flaky(name: &str, key: &str, succeed_on: i64) -> BoxStep {
    let key = key.to_string();
    BoxStep::new(FnStep::new(name, move |ctx: WorkflowContext| {
        let key = key.clone();
        async move {
            let calls = ctx.get(&key).and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            ctx.set(key, json!(calls));
            if calls >= succeed_on {
                Ok(())
            } else {
                Err(StepError::failed(format!("attempt {calls} failed")))
            }
        }
    }))
}

/// Step that sleeps for `delay` unless the context is cancelled first.
pub fn sleeper(name: &str, delay: Duration) -> BoxStep {
    BoxStep::new(FnStep::new(name, move |ctx: WorkflowContext| async move {
        tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }))
}

/// Middleware journaling `label:before` and `label:after` around the chain.
pub struct JournalMiddleware {
    pub label: &'static str,
    pub journal: Journal,
}

impl Middleware for JournalMiddleware {
    async fn handle(
        &self,
        ctx: &WorkflowContext,
        _step: &BoxStep,
        next: Next<'_>,
    ) -> Result<(), StepError> {
        self.journal.push(format!("{}:before", self.label));
        let result = next.run(ctx).await;
        self.journal.push(format!("{}:after", self.label));
        result
    }
}

/// Middleware that returns without calling `next` for the named step.
pub struct SkipStep(pub &'static str);

impl Middleware for SkipStep {
    async fn handle(
        &self,
        ctx: &WorkflowContext,
        step: &BoxStep,
        next: Next<'_>,
    ) -> Result<(), StepError> {
        if step.name() == self.0 {
            return Ok(());
        }
        next.run(ctx).await
    }
}

/// Observer recording each hook as a compact string.
///
/// A tagged log prefixes its entries with `tag/`, so several observers can
/// share one journal.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    journal: Journal,
    tag: Option<&'static str>,
}

impl EventLog {
    pub fn tagged(tag: &'static str, journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            tag: Some(tag),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.journal.entries()
    }

    fn record(&self, entry: String) {
        match self.tag {
            Some(tag) => self.journal.push(format!("{tag}/{entry}")),
            None => self.journal.push(entry),
        }
    }
}

impl WorkflowObserver for EventLog {
    fn on_workflow_started(&self, _ctx: &WorkflowContext, workflow: &str) -> ObserverResult {
        self.record(format!("workflow_started:{workflow}"));
        Ok(())
    }

    fn on_workflow_completed(
        &self,
        _ctx: &WorkflowContext,
        workflow: &str,
        _elapsed: Duration,
    ) -> ObserverResult {
        self.record(format!("workflow_completed:{workflow}"));
        Ok(())
    }

    fn on_workflow_failed(
        &self,
        _ctx: &WorkflowContext,
        workflow: &str,
        _error: &WorkflowError,
        status: WorkflowStatus,
    ) -> ObserverResult {
        self.record(format!("workflow_failed:{workflow}:{status}"));
        Ok(())
    }

    fn on_step_started(&self, _ctx: &WorkflowContext, step: &str, index: usize) -> ObserverResult {
        self.record(format!("step_started:{step}:{index}"));
        Ok(())
    }

    fn on_step_completed(
        &self,
        _ctx: &WorkflowContext,
        step: &str,
        index: usize,
        _elapsed: Duration,
        invocation: StepInvocation,
    ) -> ObserverResult {
        match invocation {
            StepInvocation::Executed => self.record(format!("step_completed:{step}:{index}")),
            StepInvocation::Skipped => self.record(format!("step_skipped:{step}:{index}")),
        }
        Ok(())
    }

    fn on_step_failed(
        &self,
        _ctx: &WorkflowContext,
        step: &str,
        index: usize,
        _error: &WorkflowError,
    ) -> ObserverResult {
        self.record(format!("step_failed:{step}:{index}"));
        Ok(())
    }
}
