//! The step contract and its object-safe wrapper.
//!
//! `Step` and `CompensatingStep` use RPITIT (native async fn in traits), so
//! they cannot be trait objects directly. Following the same blanket pattern as
//! the other boxed wrappers in this crate:
//! 1. `StepDyn` is an object-safe twin with boxed futures
//! 2. `Plain<T>` / `Compensating<T>` adapt a concrete step to `StepDyn`
//! 3. `BoxStep` wraps `Box<dyn StepDyn>` and delegates
//!
//! Two adapters instead of one blanket impl: a plain step and a compensating
//! step must box differently, and Rust has no specialization to pick between
//! them automatically.

use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;

use super::context::WorkflowContext;
use super::error::StepError;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An atomic, named unit of work executed against a `WorkflowContext`.
///
/// Steps may be invoked more than once (inside `RetryStep` or a loop), so
/// `execute` must not assume a single invocation.
pub trait Step: Send + Sync {
    /// Non-empty identifying label.
    fn name(&self) -> &str;

    /// Run the step.
    fn execute(
        &self,
        ctx: &WorkflowContext,
    ) -> impl Future<Output = Result<(), StepError>> + Send;
}

/// A step that can undo its effects during the engine's compensation pass.
pub trait CompensatingStep: Step {
    /// Roll back what `execute` did. Only the engine calls this.
    fn compensate(
        &self,
        ctx: &WorkflowContext,
    ) -> impl Future<Output = Result<(), StepError>> + Send;
}

/// Object-safe version of [`Step`] with boxed futures.
///
/// `compensate_boxed` returns `None` for steps that cannot compensate.
pub trait StepDyn: Send + Sync {
    fn name(&self) -> &str;

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
    ) -> BoxFuture<'a, Result<(), StepError>>;

    fn compensate_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
    ) -> Option<BoxFuture<'a, Result<(), StepError>>>;
}

struct Plain<T>(T);

impl<T: Step> StepDyn for Plain<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
    ) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.0.execute(ctx))
    }

    fn compensate_boxed<'a>(
        &'a self,
        _ctx: &'a WorkflowContext,
    ) -> Option<BoxFuture<'a, Result<(), StepError>>> {
        None
    }
}

struct Compensating<T>(T);

impl<T: CompensatingStep> StepDyn for Compensating<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
    ) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.0.execute(ctx))
    }

    fn compensate_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
    ) -> Option<BoxFuture<'a, Result<(), StepError>>> {
        Some(Box::pin(self.0.compensate(ctx)))
    }
}

// ---------------------------------------------------------------------------
// BoxStep
// ---------------------------------------------------------------------------

/// Type-erased step, the unit every composite and the engine hold.
pub struct BoxStep {
    inner: Box<dyn StepDyn>,
    compensating: bool,
}

impl BoxStep {
    /// Wrap a step that has no compensation.
    pub fn new<T: Step + 'static>(step: T) -> Self {
        Self {
            inner: Box::new(Plain(step)),
            compensating: false,
        }
    }

    /// Wrap a step whose `compensate` the engine should call on rollback.
    pub fn compensating<T: CompensatingStep + 'static>(step: T) -> Self {
        Self {
            inner: Box::new(Compensating(step)),
            compensating: true,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn is_compensating(&self) -> bool {
        self.compensating
    }

    /// Run the wrapped step.
    pub fn execute<'a>(&'a self, ctx: &'a WorkflowContext) -> BoxFuture<'a, Result<(), StepError>> {
        self.inner.execute_boxed(ctx)
    }

    /// Run the wrapped step's compensation, or `None` if it has none.
    pub fn compensate<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
    ) -> Option<BoxFuture<'a, Result<(), StepError>>> {
        self.inner.compensate_boxed(ctx)
    }
}

impl fmt::Debug for BoxStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxStep")
            .field("name", &self.name())
            .field("compensating", &self.compensating)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Closure-backed steps
// ---------------------------------------------------------------------------

/// Leaf step backed by an async closure.
///
/// The closure receives an owned `WorkflowContext` handle (a cheap clone that
/// shares all state), so the returned future does not borrow the caller.
///
/// ```ignore
/// let step = FnStep::new("reserve", |ctx| async move {
///     ctx.set("reserved", json!(true));
///     Ok(())
/// });
/// ```
pub struct FnStep<F> {
    name: String,
    action: F,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
{
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    /// Attach a rollback closure, producing a compensating step.
    pub fn with_compensation<C, CFut>(self, compensation: C) -> CompensableFnStep<F, C>
    where
        C: Fn(WorkflowContext) -> CFut + Send + Sync,
        CFut: Future<Output = Result<(), StepError>> + Send,
    {
        CompensableFnStep {
            name: self.name,
            action: self.action,
            compensation,
        }
    }
}

impl<F, Fut> Step for FnStep<F>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &WorkflowContext,
    ) -> impl Future<Output = Result<(), StepError>> + Send {
        (self.action)(ctx.clone())
    }
}

/// `FnStep` with a rollback closure.
pub struct CompensableFnStep<F, C> {
    name: String,
    action: F,
    compensation: C,
}

impl<F, Fut, C, CFut> Step for CompensableFnStep<F, C>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
    C: Fn(WorkflowContext) -> CFut + Send + Sync,
    CFut: Future<Output = Result<(), StepError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &WorkflowContext,
    ) -> impl Future<Output = Result<(), StepError>> + Send {
        (self.action)(ctx.clone())
    }
}

impl<F, Fut, C, CFut> CompensatingStep for CompensableFnStep<F, C>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
    C: Fn(WorkflowContext) -> CFut + Send + Sync,
    CFut: Future<Output = Result<(), StepError>> + Send,
{
    fn compensate(
        &self,
        ctx: &WorkflowContext,
    ) -> impl Future<Output = Result<(), StepError>> + Send {
        (self.compensation)(ctx.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Reserve;

    impl Step for Reserve {
        fn name(&self) -> &str {
            "reserve"
        }

        async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
            ctx.set("reserved", json!(true));
            Ok(())
        }
    }

    impl CompensatingStep for Reserve {
        async fn compensate(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
            ctx.set("reserved", json!(false));
            Ok(())
        }
    }

    #[tokio::test]
    async fn plain_box_has_no_compensation() {
        let step = BoxStep::new(Reserve);
        let ctx = WorkflowContext::new();
        assert_eq!(step.name(), "reserve");
        assert!(!step.is_compensating());
        step.execute(&ctx).await.unwrap();
        assert_eq!(ctx.get("reserved"), Some(json!(true)));
        assert!(step.compensate(&ctx).is_none());
    }

    #[tokio::test]
    async fn compensating_box_runs_rollback() {
        let step = BoxStep::compensating(Reserve);
        let ctx = WorkflowContext::new();
        assert!(step.is_compensating());
        step.execute(&ctx).await.unwrap();
        step.compensate(&ctx).unwrap().await.unwrap();
        assert_eq!(ctx.get("reserved"), Some(json!(false)));
    }

    #[tokio::test]
    async fn fn_step_runs_closure() {
        let step = FnStep::new("count", |ctx: WorkflowContext| async move {
            let n = ctx.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            ctx.set("n", json!(n + 1));
            Ok(())
        });
        let step = BoxStep::new(step);
        let ctx = WorkflowContext::new();
        step.execute(&ctx).await.unwrap();
        step.execute(&ctx).await.unwrap();
        assert_eq!(ctx.get("n"), Some(json!(2)));
    }

    #[tokio::test]
    async fn fn_step_with_compensation() {
        let step = FnStep::new("charge", |ctx: WorkflowContext| async move {
            ctx.set("charged", json!(true));
            Ok(())
        })
        .with_compensation(|ctx: WorkflowContext| async move {
            ctx.set("refunded", json!(true));
            Ok(())
        });
        let step = BoxStep::compensating(step);
        let ctx = WorkflowContext::new();
        step.execute(&ctx).await.unwrap();
        step.compensate(&ctx).unwrap().await.unwrap();
        assert_eq!(ctx.get("refunded"), Some(json!(true)));
    }

    #[test]
    fn debug_impl() {
        let debug = format!("{:?}", BoxStep::new(Reserve));
        assert!(debug.contains("reserve"));
    }
}
