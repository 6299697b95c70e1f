//! Configuration types for the workflow engine and its host.
//!
//! `HostConfig` represents a `stepflow.toml` file: engine behaviour plus the
//! logging setup a host applies before running workflows. All fields default.

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Engine-level behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run the reverse-order compensation pass when a top-level step faults.
    #[serde(default)]
    pub enable_compensation: bool,

    /// Capacity of the broadcast channel used by event-bus observers.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_compensation: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Config with compensation switched on.
    pub fn with_compensation() -> Self {
        Self {
            enable_compensation: true,
            ..Self::default()
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.event_channel_capacity == 0 {
            return Err(TypeError::InvalidConfig(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging setup applied by a host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Bridge tracing spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            otel: false,
        }
    }
}

/// Top-level host configuration (`stepflow.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}
