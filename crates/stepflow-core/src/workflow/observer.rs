//! Lifecycle observers notified by the engine.
//!
//! Every hook has a no-op default, so an observer only implements what it
//! cares about. Hooks run sequentially in registration order on the engine's
//! own task; an error from any hook stops the run and escapes `execute`.

use std::time::Duration;

use chrono::Utc;
use stepflow_types::event::WorkflowEvent;
use stepflow_types::workflow::WorkflowStatus;

use crate::event::EventBus;

use super::context::WorkflowContext;
use super::error::WorkflowError;
use super::middleware::StepInvocation;

/// Result type returned by observer hooks.
pub type ObserverResult = Result<(), anyhow::Error>;

/// Receives the six engine lifecycle notifications.
pub trait WorkflowObserver: Send + Sync {
    fn on_workflow_started(&self, _ctx: &WorkflowContext, _workflow: &str) -> ObserverResult {
        Ok(())
    }

    fn on_workflow_completed(
        &self,
        _ctx: &WorkflowContext,
        _workflow: &str,
        _elapsed: Duration,
    ) -> ObserverResult {
        Ok(())
    }

    /// `status` is the terminal status the run is about to return.
    fn on_workflow_failed(
        &self,
        _ctx: &WorkflowContext,
        _workflow: &str,
        _error: &WorkflowError,
        _status: WorkflowStatus,
    ) -> ObserverResult {
        Ok(())
    }

    fn on_step_started(&self, _ctx: &WorkflowContext, _step: &str, _index: usize) -> ObserverResult {
        Ok(())
    }

    fn on_step_completed(
        &self,
        _ctx: &WorkflowContext,
        _step: &str,
        _index: usize,
        _elapsed: Duration,
        _invocation: StepInvocation,
    ) -> ObserverResult {
        Ok(())
    }

    fn on_step_failed(
        &self,
        _ctx: &WorkflowContext,
        _step: &str,
        _index: usize,
        _error: &WorkflowError,
    ) -> ObserverResult {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TracingObserver
// ---------------------------------------------------------------------------

/// Logs every lifecycle notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WorkflowObserver for TracingObserver {
    fn on_workflow_started(&self, ctx: &WorkflowContext, workflow: &str) -> ObserverResult {
        tracing::info!(
            workflow,
            workflow_id = %ctx.workflow_id(),
            correlation_id = %ctx.correlation_id(),
            "workflow started"
        );
        Ok(())
    }

    fn on_workflow_completed(
        &self,
        ctx: &WorkflowContext,
        workflow: &str,
        elapsed: Duration,
    ) -> ObserverResult {
        tracing::info!(
            workflow,
            workflow_id = %ctx.workflow_id(),
            elapsed_ms = elapsed.as_millis() as u64,
            "workflow completed"
        );
        Ok(())
    }

    fn on_workflow_failed(
        &self,
        ctx: &WorkflowContext,
        workflow: &str,
        error: &WorkflowError,
        status: WorkflowStatus,
    ) -> ObserverResult {
        tracing::error!(
            workflow,
            workflow_id = %ctx.workflow_id(),
            step = error.step_name.as_str(),
            %status,
            error = %error.error,
            "workflow failed"
        );
        Ok(())
    }

    fn on_step_started(&self, ctx: &WorkflowContext, step: &str, index: usize) -> ObserverResult {
        tracing::debug!(step, index, workflow_id = %ctx.workflow_id(), "step started");
        Ok(())
    }

    fn on_step_completed(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        index: usize,
        elapsed: Duration,
        invocation: StepInvocation,
    ) -> ObserverResult {
        tracing::debug!(
            step,
            index,
            workflow_id = %ctx.workflow_id(),
            elapsed_ms = elapsed.as_millis() as u64,
            skipped = invocation == StepInvocation::Skipped,
            "step completed"
        );
        Ok(())
    }

    fn on_step_failed(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        index: usize,
        error: &WorkflowError,
    ) -> ObserverResult {
        tracing::warn!(
            step,
            index,
            workflow_id = %ctx.workflow_id(),
            error = %error.error,
            "step failed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BroadcastObserver
// ---------------------------------------------------------------------------

/// Publishes each notification as a [`WorkflowEvent`] on an [`EventBus`].
///
/// Publishing never fails: with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    bus: EventBus,
}

impl BroadcastObserver {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl WorkflowObserver for BroadcastObserver {
    fn on_workflow_started(&self, ctx: &WorkflowContext, workflow: &str) -> ObserverResult {
        self.bus.publish(WorkflowEvent::WorkflowStarted {
            workflow_id: ctx.workflow_id(),
            correlation_id: ctx.correlation_id(),
            workflow_name: workflow.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    fn on_workflow_completed(
        &self,
        ctx: &WorkflowContext,
        workflow: &str,
        elapsed: Duration,
    ) -> ObserverResult {
        self.bus.publish(WorkflowEvent::WorkflowCompleted {
            workflow_id: ctx.workflow_id(),
            workflow_name: workflow.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            at: Utc::now(),
        });
        Ok(())
    }

    fn on_workflow_failed(
        &self,
        ctx: &WorkflowContext,
        workflow: &str,
        error: &WorkflowError,
        status: WorkflowStatus,
    ) -> ObserverResult {
        self.bus.publish(WorkflowEvent::WorkflowFailed {
            workflow_id: ctx.workflow_id(),
            workflow_name: workflow.to_string(),
            step_name: error.step_name.clone(),
            error: error.message(),
            status,
            at: Utc::now(),
        });
        Ok(())
    }

    fn on_step_started(&self, ctx: &WorkflowContext, step: &str, index: usize) -> ObserverResult {
        self.bus.publish(WorkflowEvent::StepStarted {
            workflow_id: ctx.workflow_id(),
            step_name: step.to_string(),
            step_index: index,
            at: Utc::now(),
        });
        Ok(())
    }

    fn on_step_completed(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        index: usize,
        elapsed: Duration,
        invocation: StepInvocation,
    ) -> ObserverResult {
        self.bus.publish(WorkflowEvent::StepCompleted {
            workflow_id: ctx.workflow_id(),
            step_name: step.to_string(),
            step_index: index,
            duration_ms: elapsed.as_millis() as u64,
            skipped: invocation == StepInvocation::Skipped,
            at: Utc::now(),
        });
        Ok(())
    }

    fn on_step_failed(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        index: usize,
        error: &WorkflowError,
    ) -> ObserverResult {
        self.bus.publish(WorkflowEvent::StepFailed {
            workflow_id: ctx.workflow_id(),
            step_name: step.to_string(),
            step_index: index,
            error: error.message(),
            at: Utc::now(),
        });
        Ok(())
    }
}
