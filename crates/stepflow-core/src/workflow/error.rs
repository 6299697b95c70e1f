//! Error types for step execution and engine construction.
//!
//! `StepError` is what a step returns when it does not complete. The engine
//! turns every non-cancellation `StepError` that escapes a top-level step into
//! exactly one `WorkflowError` record on the context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors that can occur while a step executes.
#[derive(Debug, Error)]
pub enum StepError {
    /// The execution's cancellation token fired. Never recorded as a fault.
    #[error("step cancelled")]
    Cancelled,

    /// A `TimeoutStep` limit elapsed before its inner step finished.
    #[error("step '{step}' timed out after {}", format_duration(.limit))]
    Timeout { step: String, limit: Duration },

    /// A loop guard was exceeded.
    #[error("loop '{step}' exceeded {limit} iterations")]
    IterationLimit { step: String, limit: u32 },

    /// A parallel branch task panicked.
    #[error("parallel branch '{step}' panicked: {message}")]
    Panicked { step: String, message: String },

    /// Plain message fault.
    #[error("{0}")]
    Failed(String),

    /// Any other error raised by step code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    /// Build a plain message fault.
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }

    /// Whether this is the cancellation kind.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Cancelled)
    }

    /// Whether this error is, or wraps, a value of type `E`.
    ///
    /// For `Other` the whole anyhow chain is searched. `StepError` itself
    /// always matches, so `is::<StepError>()` acts as a catch-all.
    pub fn is<E>(&self) -> bool
    where
        E: std::error::Error + 'static,
    {
        if let StepError::Other(err) = self {
            if err.chain().any(|cause| cause.is::<E>()) {
                return true;
            }
        }
        (self as &(dyn std::error::Error + 'static)).is::<E>()
    }
}

/// Render a duration the way timeout messages show it: `50ms`, `30s`.
///
/// Anything that is not a whole number of milliseconds below one second, or
/// of seconds above it, uses the exact `Debug` form (`1.001s`, `250µs`).
pub fn format_duration(duration: &Duration) -> String {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        return format!("{duration:?}");
    }
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{duration:?}")
    }
}

// ---------------------------------------------------------------------------
// WorkflowError
// ---------------------------------------------------------------------------

/// Record of an unhandled step fault, appended to the context by the engine.
#[derive(Debug, Clone)]
pub struct WorkflowError {
    /// Name of the top-level step that faulted.
    pub step_name: String,
    /// The captured fault.
    pub error: Arc<StepError>,
    /// When the fault was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowError {
    /// Capture a fault for `step_name`, timestamped now.
    pub fn new(step_name: impl Into<String>, error: StepError) -> Self {
        Self {
            step_name: step_name.into(),
            error: Arc::new(error),
            occurred_at: Utc::now(),
        }
    }

    /// Display message of the captured fault.
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed: {}", self.step_name, self.error)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors that escape `WorkflowEngine` instead of becoming a result status.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid engine assembly (blank workflow or step name).
    #[error("validation error: {0}")]
    Validation(String),

    /// An observer hook returned an error; execution stopped there.
    #[error("observer failed during {hook}: {error}")]
    Observer {
        hook: &'static str,
        error: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("card declined")]
    struct CardDeclined;

    #[derive(Debug, Error)]
    #[error("out of stock")]
    struct OutOfStock;

    #[test]
    fn timeout_message_names_step_and_limit() {
        let err = StepError::Timeout {
            step: "fetch".to_string(),
            limit: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "step 'fetch' timed out after 50ms");
    }

    #[test]
    fn format_duration_variants() {
        assert_eq!(format_duration(&Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn format_duration_keeps_odd_limits_exact() {
        assert_eq!(format_duration(&Duration::from_millis(1001)), "1.001s");
        assert_eq!(format_duration(&Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(&Duration::from_micros(1500)), "1.5ms");

        let err = StepError::Timeout {
            step: "ship".to_string(),
            limit: Duration::from_millis(1001),
        };
        assert_eq!(err.to_string(), "step 'ship' timed out after 1.001s");
    }

    #[test]
    fn is_finds_typed_error_in_chain() {
        let err = StepError::from(anyhow::Error::new(CardDeclined).context("charging payment"));
        assert!(err.is::<CardDeclined>());
        assert!(!err.is::<OutOfStock>());
    }

    #[test]
    fn step_error_type_matches_everything() {
        assert!(StepError::failed("boom").is::<StepError>());
        assert!(StepError::from(anyhow::Error::new(OutOfStock)).is::<StepError>());
    }

    #[test]
    fn is_cancelled_only_for_cancellation() {
        assert!(StepError::Cancelled.is_cancelled());
        assert!(!StepError::failed("x").is_cancelled());
    }

    #[test]
    fn workflow_error_display() {
        let err = WorkflowError::new("charge", StepError::failed("card declined"));
        assert_eq!(err.to_string(), "step 'charge' failed: card declined");
        assert_eq!(err.message(), "card declined");
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::Validation("workflow name must not be empty".to_string());
        assert!(err.to_string().contains("validation error"));

        let err = EngineError::Observer {
            hook: "on_step_started",
            error: anyhow::anyhow!("sink closed"),
        };
        assert_eq!(err.to_string(), "observer failed during on_step_started: sink closed");
    }
}
