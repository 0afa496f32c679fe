//! # Registry Error Types
//!
//! Unified error handling for registry-center operations. Coordination-service
//! failures are carried as [`CoordinationError`] and wrapped by [`RegistryError`]
//! together with the local failures (configuration, seed resource, lifecycle).

use crate::coordinator::CoordinationError;
use thiserror::Error;

/// Registry operation result type
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Comprehensive error types for registry-center operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration loading failed: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Local properties file not found: {path}")]
    LocalPropertiesNotFound { path: String },

    #[error("Failed to read local properties {path}: {reason}")]
    LocalPropertiesUnreadable { path: String, reason: String },

    #[error("Registry center is not started")]
    NotStarted,

    #[error("Registry center is already started")]
    AlreadyStarted,

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Connection to {servers} failed after {attempts} attempts: {source}")]
    ConnectRetriesExhausted {
        servers: String,
        attempts: u32,
        #[source]
        source: CoordinationError,
    },

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

impl RegistryError {
    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Local deployment mistakes that must fail `init` instead of degrading
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RegistryError::ConfigurationError(_)
                | RegistryError::ConfigLoad(_)
                | RegistryError::LocalPropertiesNotFound { .. }
                | RegistryError::LocalPropertiesUnreadable { .. }
                | RegistryError::InvalidPath { .. }
        )
    }

    /// Check if error is recoverable (worth retrying)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            RegistryError::Coordination(e) => e.is_transient(),
            RegistryError::ConnectRetriesExhausted { .. } => true,
            _ => false,
        }
    }

    /// The coordination-service failure behind this error, if any
    pub fn coordination_error(&self) -> Option<&CoordinationError> {
        match self {
            RegistryError::Coordination(e) => Some(e),
            RegistryError::ConnectRetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}
