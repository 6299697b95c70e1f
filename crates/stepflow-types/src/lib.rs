//! Shared domain types for stepflow.
//!
//! This crate contains the types that cross the boundary between the engine
//! and its hosts: workflow status, lifecycle events, and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
