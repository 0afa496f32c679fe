//! # Registry Error Policy
//!
//! Single classification point for failures surfaced by the sentinel-valued
//! registry surface. Each failure is mapped to an [`ErrorDisposition`]:
//!
//! - **Ignored**: connection loss, missing node, existing node (also when the
//!   cause of an aborted transaction). Expected churn; logged at debug.
//! - **Interrupted**: re-asserted by raising a sticky interrupt flag that the
//!   caller must observe and clear. Never dropped.
//! - **Logged**: everything else, logged at error level.
//!
//! Counters per disposition keep degraded operations observable even though
//! the returned sentinel looks like a legitimate "absent".

use crate::coordinator::CoordinationError;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How a failure was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDisposition {
    Ignored,
    Interrupted,
    Logged,
}

/// Snapshot of the policy counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPolicyStats {
    pub ignored: u64,
    pub interrupted: u64,
    pub logged: u64,
}

#[derive(Debug, Default)]
struct PolicyState {
    interrupted: AtomicBool,
    ignored: AtomicU64,
    interruptions: AtomicU64,
    logged: AtomicU64,
}

/// Shared error policy; clones observe the same flag and counters
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    state: Arc<PolicyState>,
}

impl ErrorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify without side effects
    pub fn classify(err: &RegistryError) -> ErrorDisposition {
        match err.coordination_error().map(CoordinationError::root_cause) {
            Some(CoordinationError::Interrupted(_)) => ErrorDisposition::Interrupted,
            Some(
                CoordinationError::ConnectionLoss(_)
                | CoordinationError::NoNode { .. }
                | CoordinationError::NodeExists { .. },
            ) if !matches!(err, RegistryError::ConnectRetriesExhausted { .. }) => {
                ErrorDisposition::Ignored
            }
            _ => ErrorDisposition::Logged,
        }
    }

    /// Handle a failure raised by `operation` on `key`
    pub fn handle(&self, operation: &str, key: &str, err: &RegistryError) -> ErrorDisposition {
        let disposition = Self::classify(err);
        match disposition {
            ErrorDisposition::Ignored => {
                self.state.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(operation = operation, key = key, error = %err, "Ignored registry exception");
            }
            ErrorDisposition::Interrupted => {
                self.state.interruptions.fetch_add(1, Ordering::Relaxed);
                self.state.interrupted.store(true, Ordering::Release);
                warn!(operation = operation, key = key, error = %err, "Registry operation interrupted");
            }
            ErrorDisposition::Logged => {
                self.state.logged.fetch_add(1, Ordering::Relaxed);
                error!(operation = operation, key = key, error = %err, "❌ Registry operation failed");
            }
        }
        disposition
    }

    /// Whether an interruption was raised and not yet cleared
    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::Acquire)
    }

    /// Clear the interrupt flag, returning its previous value
    pub fn clear_interrupted(&self) -> bool {
        self.state.interrupted.swap(false, Ordering::AcqRel)
    }

    pub fn stats(&self) -> ErrorPolicyStats {
        ErrorPolicyStats {
            ignored: self.state.ignored.load(Ordering::Relaxed),
            interrupted: self.state.interruptions.load(Ordering::Relaxed),
            logged: self.state.logged.load(Ordering::Relaxed),
        }
    }
}
