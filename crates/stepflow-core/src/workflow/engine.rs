//! Workflow engine: sequential top-level loop with saga compensation.
//!
//! # Execution flow
//!
//! 1. Raise `on_workflow_started`.
//! 2. For each top-level step: stop with `Aborted` if the context is cancelled
//!    or aborted, record the current step, raise `on_step_started`, run the
//!    step through the middleware pipeline.
//!    Only steps whose body actually ran become compensation candidates.
//! 3. On a fault: record one `WorkflowError`, raise `on_step_failed`, run the
//!    compensation pass when enabled, raise `on_workflow_failed`.
//! 4. After the last step: raise `on_workflow_completed`.
//!
//! Cancellation never records an error and never compensates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stepflow_types::config::EngineConfig;
use stepflow_types::workflow::WorkflowStatus;

use super::context::WorkflowContext;
use super::error::{EngineError, StepError, WorkflowError};
use super::middleware::{BoxMiddleware, MiddlewarePipeline, StepInvocation};
use super::observer::{ObserverResult, WorkflowObserver};
use super::step::BoxStep;

// ---------------------------------------------------------------------------
// WorkflowResult
// ---------------------------------------------------------------------------

/// Outcome of one `WorkflowEngine::execute` call.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    /// Terminal status: Completed, Faulted, Aborted or Compensated.
    pub status: WorkflowStatus,
    /// The context as the run left it.
    pub context: WorkflowContext,
    /// Names of the top-level steps whose body ran to completion, in execution
    /// order. Steps skipped by middleware are not listed.
    pub completed_steps: Vec<String>,
    /// Wall-clock time spent in `execute`.
    pub elapsed: Duration,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Faults recorded on the context.
    pub fn errors(&self) -> Vec<WorkflowError> {
        self.context.errors()
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Runs an ordered list of top-level steps against one context.
pub struct WorkflowEngine {
    name: String,
    steps: Vec<BoxStep>,
    pipeline: MiddlewarePipeline,
    observers: Vec<Arc<dyn WorkflowObserver>>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Assemble an engine.
    ///
    /// Fails with `EngineError::Validation` when the workflow name or any
    /// top-level step name is blank.
    pub fn new(
        name: impl Into<String>,
        steps: Vec<BoxStep>,
        middleware: Vec<BoxMiddleware>,
        observers: Vec<Arc<dyn WorkflowObserver>>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "workflow name must not be empty".to_string(),
            ));
        }
        if let Some(index) = steps.iter().position(|s| s.name().trim().is_empty()) {
            return Err(EngineError::Validation(format!(
                "step at index {index} of workflow '{name}' has an empty name"
            )));
        }

        Ok(Self {
            name,
            steps,
            pipeline: MiddlewarePipeline::new(middleware),
            observers,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[BoxStep] {
        &self.steps
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute every top-level step against `ctx`.
    ///
    /// Every runtime outcome is reported through `WorkflowResult::status`.
    /// Only an observer hook error escapes as `Err`.
    pub async fn execute(&self, ctx: WorkflowContext) -> Result<WorkflowResult, EngineError> {
        let run_start = Instant::now();
        let mut completed: Vec<usize> = Vec::new();

        tracing::debug!(
            workflow = self.name.as_str(),
            workflow_id = %ctx.workflow_id(),
            steps = self.steps.len(),
            middleware = self.pipeline.len(),
            "starting workflow execution"
        );

        self.notify("on_workflow_started", |o| {
            o.on_workflow_started(&ctx, &self.name)
        })?;

        for (index, step) in self.steps.iter().enumerate() {
            if ctx.is_cancelled() {
                tracing::info!(
                    workflow = self.name.as_str(),
                    step = step.name(),
                    "workflow cancelled before step"
                );
                return Ok(self.finish(ctx, WorkflowStatus::Aborted, &completed, run_start));
            }
            if ctx.is_aborted() {
                tracing::info!(
                    workflow = self.name.as_str(),
                    step = step.name(),
                    "workflow aborted before step"
                );
                return Ok(self.finish(ctx, WorkflowStatus::Aborted, &completed, run_start));
            }

            ctx.set_current_step(step.name(), index);
            self.notify("on_step_started", |o| {
                o.on_step_started(&ctx, step.name(), index)
            })?;

            let step_start = Instant::now();
            match self.pipeline.run(&ctx, step).await {
                Ok(invocation) => {
                    let elapsed = step_start.elapsed();
                    self.notify("on_step_completed", |o| {
                        o.on_step_completed(&ctx, step.name(), index, elapsed, invocation)
                    })?;
                    match invocation {
                        StepInvocation::Executed => completed.push(index),
                        // Skipped steps are never compensated
                        StepInvocation::Skipped => tracing::debug!(
                            workflow = self.name.as_str(),
                            step = step.name(),
                            "step skipped by middleware"
                        ),
                    }
                }
                Err(StepError::Cancelled) => {
                    tracing::info!(
                        workflow = self.name.as_str(),
                        step = step.name(),
                        "workflow cancelled during step"
                    );
                    return Ok(self.finish(ctx, WorkflowStatus::Aborted, &completed, run_start));
                }
                Err(error) => {
                    let record = WorkflowError::new(step.name(), error);
                    ctx.push_error(record.clone());
                    self.notify("on_step_failed", |o| {
                        o.on_step_failed(&ctx, step.name(), index, &record)
                    })?;

                    let status = if self.config.enable_compensation {
                        self.compensate(&ctx, &completed).await;
                        WorkflowStatus::Compensated
                    } else {
                        WorkflowStatus::Faulted
                    };

                    self.notify("on_workflow_failed", |o| {
                        o.on_workflow_failed(&ctx, &self.name, &record, status)
                    })?;
                    return Ok(self.finish(ctx, status, &completed, run_start));
                }
            }
        }

        let elapsed = run_start.elapsed();
        self.notify("on_workflow_completed", |o| {
            o.on_workflow_completed(&ctx, &self.name, elapsed)
        })?;
        Ok(self.finish(ctx, WorkflowStatus::Completed, &completed, run_start))
    }

    /// Roll back completed top-level steps in reverse order.
    ///
    /// Every compensating step gets its turn; rollback errors are logged and
    /// discarded.
    async fn compensate(&self, ctx: &WorkflowContext, completed: &[usize]) {
        tracing::info!(
            workflow = self.name.as_str(),
            completed = completed.len(),
            "running compensation"
        );

        for &index in completed.iter().rev() {
            let step = &self.steps[index];
            let Some(rollback) = step.compensate(ctx) else {
                continue;
            };
            match rollback.await {
                Ok(()) => tracing::debug!(step = step.name(), index, "step compensated"),
                Err(e) => tracing::warn!(
                    step = step.name(),
                    index,
                    error = %e,
                    "compensation failed, continuing"
                ),
            }
        }
    }

    fn notify<F>(&self, hook: &'static str, call: F) -> Result<(), EngineError>
    where
        F: Fn(&dyn WorkflowObserver) -> ObserverResult,
    {
        for observer in &self.observers {
            call(observer.as_ref()).map_err(|error| EngineError::Observer { hook, error })?;
        }
        Ok(())
    }

    fn finish(
        &self,
        ctx: WorkflowContext,
        status: WorkflowStatus,
        completed: &[usize],
        run_start: Instant,
    ) -> WorkflowResult {
        let elapsed = run_start.elapsed();
        tracing::debug!(
            workflow = self.name.as_str(),
            workflow_id = %ctx.workflow_id(),
            %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "workflow execution finished"
        );
        WorkflowResult {
            status,
            context: ctx,
            completed_steps: completed
                .iter()
                .map(|&i| self.steps[i].name().to_string())
                .collect(),
            elapsed,
        }
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("middleware", &self.pipeline.len())
            .field("observers", &self.observers.len())
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
