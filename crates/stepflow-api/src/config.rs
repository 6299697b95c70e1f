//! Host configuration loader.
//!
//! Reads `stepflow.toml` (or the path given by `--config`) into
//! [`HostConfig`]. A missing file yields defaults; a file that exists but
//! cannot be read, parsed or validated is an error, since the host named it
//! explicitly.

use std::path::{Path, PathBuf};

use stepflow_types::config::HostConfig;
use stepflow_types::error::TypeError;
use thiserror::Error;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stepflow.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: TypeError,
    },
}

/// Load host configuration from `path`.
pub async fn load_host_config(path: &Path) -> Result<HostConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file found, using defaults");
            return Ok(HostConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config: HostConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    config
        .engine
        .validate()
        .map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(config)
}
