//! Coordination-service error types

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a coordination backend
///
/// Variants mirror the node-state and session-state failures of a
/// ZooKeeper-style ensemble so that every backend reports them uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    #[error("Version mismatch on {path}")]
    BadVersion { path: String },

    #[error("Not authorized to access {path}")]
    NoAuth { path: String },

    #[error("Ephemeral node cannot have children: {path}")]
    NoChildrenForEphemerals { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Connection lost: {0}")]
    ConnectionLoss(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Session closed")]
    SessionClosed,

    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transaction aborted at operation {index}: {source}")]
    TransactionFailed {
        index: usize,
        source: Box<CoordinationError>,
    },

    #[error("Coordination backend error: {0}")]
    Backend(String),
}

impl CoordinationError {
    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists { path: path.into() }
    }

    /// The failure that caused a transaction to abort, or `self`
    pub fn root_cause(&self) -> &CoordinationError {
        match self {
            CoordinationError::TransactionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Failures a reconnect or a later retry may clear
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root_cause(),
            CoordinationError::ConnectionLoss(_)
                | CoordinationError::SessionExpired
                | CoordinationError::Timeout(_)
        )
    }

    /// Whether the session behind the failing call is gone for good
    #[must_use]
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self.root_cause(),
            CoordinationError::SessionExpired | CoordinationError::SessionClosed
        )
    }
}

/// Coordination operation result type
pub type CoordinationResult<T> = Result<T, CoordinationError>;
