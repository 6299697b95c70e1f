//! Middleware pipeline wrapping every top-level step invocation.
//!
//! Interceptors are held in an ordered list. `Next` threads a position through
//! that list: calling `next.run(ctx)` hands control to the following
//! middleware, and past the last one, to the step itself. Registration order is
//! outer-to-inner order, so for `[m1, m2]` the call sequence is
//! m1-before, m2-before, step, m2-after, m1-after.
//!
//! A middleware that returns without calling `next` skips the step. The
//! pipeline reports that as [`StepInvocation::Skipped`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::Instrument;

use super::context::WorkflowContext;
use super::error::StepError;
use super::step::BoxStep;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An interceptor around step execution.
pub trait Middleware: Send + Sync {
    /// Handle one step invocation. Call `next.run(ctx)` to continue the chain.
    fn handle(
        &self,
        ctx: &WorkflowContext,
        step: &BoxStep,
        next: Next<'_>,
    ) -> impl Future<Output = Result<(), StepError>> + Send;
}

/// Object-safe version of [`Middleware`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `Middleware`.
pub trait MiddlewareDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        step: &'a BoxStep,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), StepError>>;
}

impl<T: Middleware> MiddlewareDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        step: &'a BoxStep,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.handle(ctx, step, next))
    }
}

/// Type-erased middleware.
pub struct BoxMiddleware {
    inner: Box<dyn MiddlewareDyn>,
}

impl BoxMiddleware {
    pub fn new<T: Middleware + 'static>(middleware: T) -> Self {
        Self {
            inner: Box::new(middleware),
        }
    }
}

impl std::fmt::Debug for BoxMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxMiddleware").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    chain: &'a [BoxMiddleware],
    step: &'a BoxStep,
    reached: &'a AtomicBool,
}

impl<'a> Next<'a> {
    /// Invoke the rest of the chain and, ultimately, the step.
    pub fn run(self, ctx: &'a WorkflowContext) -> BoxFuture<'a, Result<(), StepError>> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    step: self.step,
                    reached: self.reached,
                };
                head.inner.handle_boxed(ctx, self.step, next)
            }
            None => {
                self.reached.store(true, Ordering::SeqCst);
                self.step.execute(ctx)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Whether the step body actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInvocation {
    Executed,
    /// A middleware returned without calling `next`.
    Skipped,
}

/// Ordered interceptor chain shared by every top-level step.
#[derive(Debug, Default)]
pub struct MiddlewarePipeline {
    middleware: Vec<BoxMiddleware>,
}

impl MiddlewarePipeline {
    pub fn new(middleware: Vec<BoxMiddleware>) -> Self {
        Self { middleware }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run `step` through every middleware.
    pub async fn run(
        &self,
        ctx: &WorkflowContext,
        step: &BoxStep,
    ) -> Result<StepInvocation, StepError> {
        if self.middleware.is_empty() {
            step.execute(ctx).await?;
            return Ok(StepInvocation::Executed);
        }

        let reached = AtomicBool::new(false);
        let next = Next {
            chain: &self.middleware,
            step,
            reached: &reached,
        };
        next.run(ctx).await?;

        if reached.load(Ordering::SeqCst) {
            Ok(StepInvocation::Executed)
        } else {
            Ok(StepInvocation::Skipped)
        }
    }
}

// ---------------------------------------------------------------------------
// TracingMiddleware
// ---------------------------------------------------------------------------

/// Opens a `step` span per invocation and logs the outcome with elapsed time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    async fn handle(
        &self,
        ctx: &WorkflowContext,
        step: &BoxStep,
        next: Next<'_>,
    ) -> Result<(), StepError> {
        let span = tracing::debug_span!(
            "step",
            step = step.name(),
            workflow_id = %ctx.workflow_id(),
        );
        let start = Instant::now();
        let result = next.run(ctx).instrument(span).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::debug!(step = step.name(), elapsed_ms, "step finished"),
            Err(StepError::Cancelled) => {
                tracing::debug!(step = step.name(), elapsed_ms, "step cancelled")
            }
            Err(e) => tracing::warn!(step = step.name(), elapsed_ms, error = %e, "step failed"),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
