use thiserror::Error;

/// Errors raised while parsing or validating shared types.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("invalid workflow status: '{0}'")]
    InvalidStatus(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = TypeError::InvalidConfig("capacity must be positive".to_string());
        assert_eq!(err.to_string(), "invalid config: capacity must be positive");
    }
}
