//! Lifecycle events emitted while a workflow executes.
//!
//! `WorkflowEvent` is the serializable form of the six engine notifications.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::WorkflowStatus;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The engine entered its top-level loop.
    WorkflowStarted {
        workflow_id: Uuid,
        correlation_id: Uuid,
        workflow_name: String,
        at: DateTime<Utc>,
    },

    /// Every top-level step finished without a fault.
    WorkflowCompleted {
        workflow_id: Uuid,
        workflow_name: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    /// A top-level step faulted. `status` is `Faulted` or `Compensated`.
    WorkflowFailed {
        workflow_id: Uuid,
        workflow_name: String,
        step_name: String,
        error: String,
        status: WorkflowStatus,
        at: DateTime<Utc>,
    },

    /// A top-level step is about to run.
    StepStarted {
        workflow_id: Uuid,
        step_name: String,
        /// 0-based position among the top-level steps.
        step_index: usize,
        at: DateTime<Utc>,
    },

    /// A top-level step returned successfully.
    StepCompleted {
        workflow_id: Uuid,
        step_name: String,
        step_index: usize,
        duration_ms: u64,
        /// True when a middleware short-circuited the step.
        skipped: bool,
        at: DateTime<Utc>,
    },

    /// A top-level step faulted.
    StepFailed {
        workflow_id: Uuid,
        step_name: String,
        step_index: usize,
        error: String,
        at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// The workflow execution this event belongs to.
    pub fn workflow_id(&self) -> Uuid {
        match self {
            WorkflowEvent::WorkflowStarted { workflow_id, .. }
            | WorkflowEvent::WorkflowCompleted { workflow_id, .. }
            | WorkflowEvent::WorkflowFailed { workflow_id, .. }
            | WorkflowEvent::StepStarted { workflow_id, .. }
            | WorkflowEvent::StepCompleted { workflow_id, .. }
            | WorkflowEvent::StepFailed { workflow_id, .. } => *workflow_id,
        }
    }

    /// Short snake_case name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
            WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
            WorkflowEvent::StepStarted { .. } => "step_started",
            WorkflowEvent::StepCompleted { .. } => "step_completed",
            WorkflowEvent::StepFailed { .. } => "step_failed",
        }
    }
}
