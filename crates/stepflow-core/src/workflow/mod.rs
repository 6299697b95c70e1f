//! Workflow engine core: steps, composites, middleware and the execution loop.
//!
//! - `context` -- Shared per-execution state with cancellation
//! - `step` -- Step contract, boxed wrapper and closure-backed steps
//! - `conditional`, `parallel`, `loops`, `retry`, `timeout`, `try_catch`,
//!   `sub_workflow` -- Composite control-flow steps
//! - `middleware` -- Interceptor chain around top-level steps
//! - `observer` -- Lifecycle notifications
//! - `engine` -- Top-level loop, compensation and results

pub mod conditional;
pub mod context;
pub mod engine;
pub mod error;
pub mod loops;
pub mod middleware;
pub mod observer;
pub mod parallel;
pub mod retry;
pub mod step;
pub mod sub_workflow;
pub mod timeout;
pub mod try_catch;

#[cfg(test)]
pub(crate) mod test_support;

pub use conditional::{ConditionalStep, Predicate};
pub use context::{CurrentStep, WorkflowContext};
pub use engine::{WorkflowEngine, WorkflowResult};
pub use error::{EngineError, StepError, WorkflowError};
pub use loops::{DoWhileStep, FOR_EACH_CURRENT, FOR_EACH_INDEX, ForEachStep, WhileStep};
pub use middleware::{
    BoxMiddleware, Middleware, MiddlewarePipeline, Next, StepInvocation, TracingMiddleware,
};
pub use observer::{BroadcastObserver, ObserverResult, TracingObserver, WorkflowObserver};
pub use parallel::ParallelStep;
pub use retry::{RETRY_ATTEMPT, RetryPolicy, RetryStep};
pub use step::{BoxStep, CompensableFnStep, CompensatingStep, FnStep, Step};
pub use sub_workflow::SubWorkflowStep;
pub use timeout::TimeoutStep;
pub use try_catch::{TRY_CATCH_ERROR, TryCatchStep};
