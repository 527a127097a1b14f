//! Typed errors shared by the backends and the orchestration layer

use thiserror::Error;

/// Problems found while validating or overriding configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{section}.{key} must not be empty")]
    Missing {
        section: &'static str,
        key: &'static str,
    },

    #[error("{section}.{key} is invalid: {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        reason: String,
    },

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },
}

/// A failed call against the role or warehouse service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct CloudError {
    pub operation: &'static str,
    pub message: String,
}

impl CloudError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}
