//! Loop composites: `ForEachStep`, `WhileStep`, `DoWhileStep`.
//!
//! Every loop checks cancellation and the abort flag before each iteration.
//! Cancellation ends the loop with `StepError::Cancelled`; an abort ends it
//! with `Ok(())` and leaves the engine to notice the flag.

use serde_json::{Value, json};

use super::conditional::Predicate;
use super::context::WorkflowContext;
use super::error::StepError;
use super::step::{BoxStep, Step};

/// Property holding the current `ForEachStep` element.
pub const FOR_EACH_CURRENT: &str = "ForEach.Current";
/// Property holding the 0-based `ForEachStep` iteration index.
pub const FOR_EACH_INDEX: &str = "ForEach.Index";

/// Ok(true) when the loop should continue.
fn may_iterate(ctx: &WorkflowContext) -> Result<bool, StepError> {
    ctx.check_cancelled()?;
    Ok(!ctx.is_aborted())
}

/// Iteration counter for the predicate loops. Saturates, so an unbounded
/// loop can run indefinitely.
#[derive(Debug, Clone, Copy)]
struct IterationGuard {
    limit: Option<u32>,
    count: u32,
}

impl IterationGuard {
    fn new(limit: Option<u32>) -> Self {
        Self { limit, count: 0 }
    }

    fn is_first(&self) -> bool {
        self.count == 0
    }

    fn check(&self, step: &str) -> Result<(), StepError> {
        match self.limit {
            Some(limit) if self.count >= limit => Err(StepError::IterationLimit {
                step: step.to_string(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }
}

// ---------------------------------------------------------------------------
// ForEach
// ---------------------------------------------------------------------------

type SourceFn =
    Box<dyn Fn(&WorkflowContext) -> Box<dyn Iterator<Item = Value> + Send> + Send + Sync>;

enum Items {
    Fixed(Vec<Value>),
    Lazy(SourceFn),
}

/// Runs the body once per element of a sequence.
pub struct ForEachStep {
    name: String,
    items: Items,
    body: BoxStep,
}

impl ForEachStep {
    /// Iterate over a fixed list.
    pub fn new(name: impl Into<String>, items: Vec<Value>, body: BoxStep) -> Self {
        Self {
            name: name.into(),
            items: Items::Fixed(items),
            body,
        }
    }

    /// Iterate over a sequence produced from the context when the step runs.
    ///
    /// The source is called once per execution and consumed once.
    pub fn from_source<F, I>(name: impl Into<String>, source: F, body: BoxStep) -> Self
    where
        F: Fn(&WorkflowContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        let source: SourceFn = Box::new(
            move |ctx: &WorkflowContext| -> Box<dyn Iterator<Item = Value> + Send> {
                Box::new(source(ctx).into_iter())
            },
        );
        Self {
            name: name.into(),
            items: Items::Lazy(source),
            body,
        }
    }
}

impl Step for ForEachStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let items: Box<dyn Iterator<Item = Value> + Send + '_> = match &self.items {
            Items::Fixed(values) => Box::new(values.iter().cloned()),
            Items::Lazy(source) => source(ctx),
        };

        for (index, item) in items.enumerate() {
            if !may_iterate(ctx)? {
                tracing::debug!(step = self.name.as_str(), index, "loop stopped by abort");
                return Ok(());
            }
            ctx.set(FOR_EACH_CURRENT, item);
            ctx.set(FOR_EACH_INDEX, json!(index));
            self.body.execute(ctx).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// While / DoWhile
// ---------------------------------------------------------------------------

/// Checks the predicate before every iteration.
pub struct WhileStep {
    name: String,
    predicate: Predicate,
    body: BoxStep,
    max_iterations: Option<u32>,
}

impl WhileStep {
    pub fn new<P>(name: impl Into<String>, predicate: P, body: BoxStep) -> Self
    where
        P: Fn(&WorkflowContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: std::sync::Arc::new(predicate),
            body,
            max_iterations: None,
        }
    }

    /// Fail with `IterationLimit` instead of running the body more than `limit` times.
    pub fn max_iterations(mut self, limit: u32) -> Self {
        self.max_iterations = Some(limit);
        self
    }
}

impl Step for WhileStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let mut guard = IterationGuard::new(self.max_iterations);
        loop {
            if !may_iterate(ctx)? || !(self.predicate)(ctx) {
                return Ok(());
            }
            guard.check(&self.name)?;
            self.body.execute(ctx).await?;
            guard.record();
        }
    }
}

/// Runs the body once, then checks the predicate before every further iteration.
pub struct DoWhileStep {
    name: String,
    predicate: Predicate,
    body: BoxStep,
    max_iterations: Option<u32>,
}

impl DoWhileStep {
    pub fn new<P>(name: impl Into<String>, body: BoxStep, predicate: P) -> Self
    where
        P: Fn(&WorkflowContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: std::sync::Arc::new(predicate),
            body,
            max_iterations: None,
        }
    }

    pub fn max_iterations(mut self, limit: u32) -> Self {
        self.max_iterations = Some(limit);
        self
    }
}

impl Step for DoWhileStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let mut guard = IterationGuard::new(self.max_iterations);
        loop {
            if !may_iterate(ctx)? {
                return Ok(());
            }
            if !guard.is_first() && !(self.predicate)(ctx) {
                return Ok(());
            }
            guard.check(&self.name)?;
            self.body.execute(ctx).await?;
            guard.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::FnStep;
    use crate::workflow::test_support::Journal;

    /// Body that journals `<Index>=<Current>` and bumps `count`.
    fn recording_body(journal: &Journal) -> BoxStep {
        let journal = journal.clone();
        BoxStep::new(FnStep::new("body", move |ctx: WorkflowContext| {
            let journal = journal.clone();
            async move {
                let index = ctx.get(FOR_EACH_INDEX).unwrap_or(Value::Null);
                let current = ctx.get(FOR_EACH_CURRENT).unwrap_or(Value::Null);
                journal.push(format!("{index}={current}"));
                let count = ctx.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.set("count", json!(count + 1));
                Ok(())
            }
        }))
    }

    fn count_below(limit: i64) -> impl Fn(&WorkflowContext) -> bool + Send + Sync + 'static {
        move |ctx: &WorkflowContext| ctx.get("count").and_then(|v| v.as_i64()).unwrap_or(0) < limit
    }

    fn count(ctx: &WorkflowContext) -> i64 {
        ctx.get("count").and_then(|v| v.as_i64()).unwrap_or(0)
    }

    #[tokio::test]
    async fn for_each_sets_index_and_current() {
        let journal = Journal::default();
        let step = ForEachStep::new(
            "items",
            vec![json!("A"), json!("B"), json!("C")],
            recording_body(&journal),
        );
        step.execute(&WorkflowContext::new()).await.unwrap();

        assert_eq!(journal.entries(), vec![r#"0="A""#, r#"1="B""#, r#"2="C""#]);
    }

    #[tokio::test]
    async fn for_each_empty_runs_body_zero_times() {
        let journal = Journal::default();
        let step = ForEachStep::new("items", vec![], recording_body(&journal));
        let ctx = WorkflowContext::new();

        step.execute(&ctx).await.unwrap();

        assert!(journal.entries().is_empty());
        assert_eq!(count(&ctx), 0);
    }

    #[tokio::test]
    async fn for_each_reads_source_from_context() {
        let journal = Journal::default();
        let step = ForEachStep::from_source(
            "orders",
            |ctx: &WorkflowContext| {
                ctx.get("orders")
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default()
            },
            recording_body(&journal),
        );
        let ctx = WorkflowContext::new();
        ctx.set("orders", json!([10, 20]));

        step.execute(&ctx).await.unwrap();

        assert_eq!(journal.entries(), vec!["0=10", "1=20"]);
    }

    #[tokio::test]
    async fn for_each_stops_on_abort() {
        let journal = Journal::default();
        let inner = journal.clone();
        let body = BoxStep::new(FnStep::new("body", move |ctx: WorkflowContext| {
            let journal = inner.clone();
            async move {
                journal.push("ran");
                ctx.abort();
                Ok(())
            }
        }));
        let step = ForEachStep::new("items", vec![json!(1), json!(2), json!(3)], body);

        step.execute(&WorkflowContext::new()).await.unwrap();

        assert_eq!(journal.entries(), vec!["ran"]);
    }

    #[tokio::test]
    async fn for_each_stops_on_cancellation() {
        let body = BoxStep::new(FnStep::new("body", |ctx: WorkflowContext| async move {
            ctx.cancel();
            Ok(())
        }));
        let step = ForEachStep::new("items", vec![json!(1), json!(2)], body);
        let ctx = WorkflowContext::new();

        let err = step.execute(&ctx).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(ctx.get(FOR_EACH_INDEX), Some(json!(0)));
    }

    #[tokio::test]
    async fn while_false_runs_zero_times() {
        let journal = Journal::default();
        let step = WhileStep::new("loop", |_: &WorkflowContext| false, recording_body(&journal));
        step.execute(&WorkflowContext::new()).await.unwrap();
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn while_runs_until_predicate_fails() {
        let journal = Journal::default();
        let step = WhileStep::new("loop", count_below(3), recording_body(&journal));
        let ctx = WorkflowContext::new();

        step.execute(&ctx).await.unwrap();

        assert_eq!(count(&ctx), 3);
    }

    #[tokio::test]
    async fn do_while_false_runs_once() {
        let journal = Journal::default();
        let step = DoWhileStep::new("loop", recording_body(&journal), |_: &WorkflowContext| false);
        let ctx = WorkflowContext::new();

        step.execute(&ctx).await.unwrap();

        assert_eq!(count(&ctx), 1);
    }

    #[tokio::test]
    async fn do_while_runs_until_predicate_fails() {
        let journal = Journal::default();
        let step = DoWhileStep::new("loop", recording_body(&journal), count_below(4));
        let ctx = WorkflowContext::new();

        step.execute(&ctx).await.unwrap();

        assert_eq!(count(&ctx), 4);
    }

    #[tokio::test]
    async fn max_iterations_guard_fails_runaway_loop() {
        let journal = Journal::default();
        let step = WhileStep::new("spin", |_: &WorkflowContext| true, recording_body(&journal))
            .max_iterations(5);
        let ctx = WorkflowContext::new();

        let err = step.execute(&ctx).await.unwrap_err();

        assert!(matches!(err, StepError::IterationLimit { limit: 5, .. }));
        assert_eq!(count(&ctx), 5);
    }

    #[tokio::test]
    async fn while_stops_on_cancellation() {
        let ctx = WorkflowContext::new();
        ctx.cancel();
        let journal = Journal::default();
        let step = WhileStep::new("loop", |_: &WorkflowContext| true, recording_body(&journal));

        let err = step.execute(&ctx).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn iteration_guard_saturates_without_limit() {
        let mut guard = IterationGuard {
            limit: None,
            count: u32::MAX - 1,
        };
        guard.record();
        guard.record();

        assert_eq!(guard.count, u32::MAX);
        assert!(!guard.is_first());
        assert!(guard.check("poll").is_ok());
    }

    #[test]
    fn iteration_guard_stops_at_limit() {
        let mut guard = IterationGuard::new(Some(2));
        assert!(guard.check("poll").is_ok());
        guard.record();
        guard.record();

        let err = guard.check("poll").unwrap_err();
        assert!(matches!(err, StepError::IterationLimit { limit: 2, .. }));
    }
}
