//! Shared execution context threaded through every step of a workflow run.
//!
//! `WorkflowContext` is a cheap-to-clone handle. Every clone points at the same
//! `Arc`-backed state: identifiers, the property bag, the abort flag, the error
//! list and the engine's current-step marker. The cancellation token lives on
//! the handle itself so a derived view can carry a child token while still
//! sharing everything else.
//!
//! Property values are cloned on read so no `DashMap` guard is ever held across
//! an `.await` point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::{StepError, WorkflowError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ContextState {
    workflow_id: Uuid,
    correlation_id: Uuid,
    properties: DashMap<String, Value>,
    current_step: Mutex<Option<CurrentStep>>,
    aborted: AtomicBool,
    errors: Mutex<Vec<WorkflowError>>,
}

/// The top-level step the engine is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentStep {
    pub name: String,
    pub index: usize,
}

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// Mutable state shared by every step and middleware in one execution.
///
/// Cloning produces a shared view of the same underlying data. Writes to the
/// same property key from concurrent branches are last-writer-wins.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    state: Arc<ContextState>,
    cancellation: CancellationToken,
}

impl WorkflowContext {
    /// Create a context with fresh workflow and correlation IDs.
    pub fn new() -> Self {
        Self::with_correlation_id(Uuid::now_v7())
    }

    /// Create a context that joins an existing trace via `correlation_id`.
    pub fn with_correlation_id(correlation_id: Uuid) -> Self {
        Self {
            state: Arc::new(ContextState {
                workflow_id: Uuid::now_v7(),
                correlation_id,
                properties: DashMap::new(),
                current_step: Mutex::new(None),
                aborted: AtomicBool::new(false),
                errors: Mutex::new(Vec::new()),
            }),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token, typically with one the host controls.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Derived view sharing all state but holding a child cancellation token.
    ///
    /// Cancelling the parent cancels the view; cancelling the view leaves the
    /// parent untouched.
    pub fn with_child_cancellation(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.state.workflow_id
    }

    pub fn correlation_id(&self) -> Uuid {
        self.state.correlation_id
    }

    // -- Properties ---------------------------------------------------------

    /// Get a cloned copy of the property at `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.properties.get(key).map(|r| r.value().clone())
    }

    /// Insert or overwrite a property.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.state.properties.insert(key.into(), value);
    }

    /// Remove a property and return its value, if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.properties.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.properties.contains_key(key)
    }

    /// Snapshot of all current keys.
    pub fn keys(&self) -> Vec<String> {
        self.state.properties.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshot of the whole property bag.
    pub fn properties(&self) -> HashMap<String, Value> {
        self.state
            .properties
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Read a property and deserialize it into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StepError> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                StepError::failed(format!("property '{key}' has unexpected shape: {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it under `key`.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), StepError> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| StepError::failed(format!("property '{key}' is not serializable: {e}")))?;
        self.set(key, value);
        Ok(())
    }

    // -- Current step -------------------------------------------------------

    /// The top-level step the engine last started, if any.
    pub fn current_step(&self) -> Option<CurrentStep> {
        self.state
            .current_step
            .lock()
            .expect("context step lock poisoned")
            .clone()
    }

    pub fn current_step_name(&self) -> Option<String> {
        self.current_step().map(|s| s.name)
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.current_step().map(|s| s.index)
    }

    /// Only the engine's top-level loop writes this.
    pub(crate) fn set_current_step(&self, name: &str, index: usize) {
        *self
            .state
            .current_step
            .lock()
            .expect("context step lock poisoned") = Some(CurrentStep {
            name: name.to_string(),
            index,
        });
    }

    // -- Abort --------------------------------------------------------------

    /// Request a graceful stop; the engine checks this before each step.
    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    // -- Errors -------------------------------------------------------------

    /// Snapshot of the recorded faults, in the order they were recorded.
    pub fn errors(&self) -> Vec<WorkflowError> {
        self.state
            .errors
            .lock()
            .expect("context error lock poisoned")
            .clone()
    }

    pub fn error_count(&self) -> usize {
        self.state
            .errors
            .lock()
            .expect("context error lock poisoned")
            .len()
    }

    /// Append a fault record. The list is append-only.
    pub fn push_error(&self, error: WorkflowError) {
        self.state
            .errors
            .lock()
            .expect("context error lock poisoned")
            .push(error);
    }

    // -- Cancellation -------------------------------------------------------

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this context (and every view derived from it).
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check_cancelled(&self) -> Result<(), StepError> {
        if self.is_cancelled() {
            Err(StepError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
