//! Configuration error types.

use thiserror::Error;

/// Errors raised while reading the process environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A `.env` file exists but could not be loaded.
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid_value(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ConfigError::invalid_value("GRPC_ADDR", "not an address");
        assert_eq!(err.to_string(), "invalid value for GRPC_ADDR: not an address");
    }
}
