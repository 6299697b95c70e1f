//! Embeddable workflow execution engine.
//!
//! Steps are assembled into a tree of composites, wrapped in a
//! [`WorkflowEngine`](workflow::WorkflowEngine) together with middleware and
//! observers, and executed against a shared
//! [`WorkflowContext`](workflow::WorkflowContext). This crate depends only on
//! `stepflow-types` and never installs a tracing subscriber.

pub mod event;
pub mod workflow;
