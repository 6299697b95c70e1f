//! Workflow status types shared by the engine and its hosts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle status of a workflow execution.
///
/// The engine only ever produces the terminal values `Completed`, `Faulted`,
/// `Aborted` and `Compensated`. `Pending`, `Running` and `Suspended` exist for
/// orchestration layers that track runs outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Faulted,
    Aborted,
    Compensated,
    Suspended,
}

impl WorkflowStatus {
    /// Whether this status ends an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Faulted
                | WorkflowStatus::Aborted
                | WorkflowStatus::Compensated
        )
    }

    /// Whether this status represents a successful run.
    pub fn is_success(&self) -> bool {
        *self == WorkflowStatus::Completed
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Faulted => write!(f, "faulted"),
            WorkflowStatus::Aborted => write!(f, "aborted"),
            WorkflowStatus::Compensated => write!(f, "compensated"),
            WorkflowStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "faulted" => Ok(WorkflowStatus::Faulted),
            "aborted" => Ok(WorkflowStatus::Aborted),
            "compensated" => Ok(WorkflowStatus::Compensated),
            "suspended" => Ok(WorkflowStatus::Suspended),
            other => Err(TypeError::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Faulted.is_terminal());
        assert!(WorkflowStatus::Aborted.is_terminal());
        assert!(WorkflowStatus::Compensated.is_terminal());
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(!WorkflowStatus::Suspended.is_terminal());
    }

    #[test]
    fn only_completed_is_success() {
        assert!(WorkflowStatus::Completed.is_success());
        assert!(!WorkflowStatus::Compensated.is_success());
        assert!(!WorkflowStatus::Aborted.is_success());
    }

    #[test]
    fn display_and_parse_agree() {
        for status in [
            WorkflowStatus::Pending,
            WorkflowStatus::Running,
            WorkflowStatus::Completed,
            WorkflowStatus::Faulted,
            WorkflowStatus::Aborted,
            WorkflowStatus::Compensated,
            WorkflowStatus::Suspended,
        ] {
            let parsed: WorkflowStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "Compensated".parse::<WorkflowStatus>().unwrap(),
            WorkflowStatus::Compensated
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "exploded".parse::<WorkflowStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid workflow status: 'exploded'");
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&WorkflowStatus::Compensated).unwrap();
        assert_eq!(json, "\"compensated\"");
    }
}
