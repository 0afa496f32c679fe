//! Value types shared by every coordination backend

use crate::constants::DIGEST_SCHEME;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Node kind chosen at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateMode {
    /// Survives session loss
    Persistent,
    /// Survives session loss; the service appends a unique suffix
    PersistentSequential,
    /// Removed when the creating session ends
    Ephemeral,
    /// Removed when the creating session ends; the service appends a unique suffix
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Node metadata maintained by the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStat {
    /// Transaction id that created the node
    pub czxid: i64,
    /// Transaction id of the last data change
    pub mzxid: i64,
    /// Creation time, milliseconds since the epoch
    pub ctime: i64,
    /// Last modification time, milliseconds since the epoch
    pub mtime: i64,
    /// Number of data changes
    pub version: i32,
    /// Number of child changes
    pub cversion: i32,
    /// Owning session for ephemeral nodes, zero otherwise
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
}

/// Access control applied to created nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclPolicy {
    /// World readable and writable
    Open,
    /// Only sessions authenticated as the creator may access the node
    CreatorAll,
}

/// Authentication presented when the session is established
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub scheme: String,
    pub auth: String,
}

impl Credentials {
    /// `user:password` digest credentials
    pub fn digest(auth: impl Into<String>) -> Self {
        Self {
            scheme: DIGEST_SCHEME.to_string(),
            auth: auth.into(),
        }
    }

    /// Identity recorded on nodes created by this session
    pub fn identity(&self) -> String {
        let user = self.auth.split(':').next().unwrap_or_default();
        format!("{}:{}", self.scheme, user)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("scheme", &self.scheme)
            .field("auth", &"***")
            .finish()
    }
}

/// Everything a backend needs to open one session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub servers: String,
    pub session_timeout: Duration,
    pub connection_timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl SessionOptions {
    /// ACL applied to nodes created by the session
    pub fn acl_policy(&self) -> AclPolicy {
        if self.credentials.is_some() {
            AclPolicy::CreatorAll
        } else {
            AclPolicy::Open
        }
    }
}

/// Change notification delivered by a recursive watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDataChanged,
    NodeDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

/// One operation of an all-or-nothing transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    /// Require the node to exist, optionally at a specific version
    Check {
        path: String,
        version: Option<i32>,
    },
    Create {
        path: String,
        data: Vec<u8>,
        mode: CreateMode,
    },
    SetData {
        path: String,
        data: Vec<u8>,
        version: Option<i32>,
    },
    Delete {
        path: String,
        version: Option<i32>,
    },
}

impl TxnOp {
    pub fn path(&self) -> &str {
        match self {
            TxnOp::Check { path, .. }
            | TxnOp::Create { path, .. }
            | TxnOp::SetData { path, .. }
            | TxnOp::Delete { path, .. } => path,
        }
    }
}

/// Outcome of one committed transaction operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnResult {
    Checked,
    Created { path: String },
    DataSet { stat: NodeStat },
    Deleted,
}

/// Receiving end of a recursive watch
///
/// Events arrive in the order the service applied the changes. The channel
/// closes when the owning session ends. Dropping the watcher unregisters it.
#[derive(Debug)]
pub struct TreeWatcher {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    pump: Option<JoinHandle<()>>,
}

impl TreeWatcher {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self { events, pump: None }
    }

    /// Watcher fed by a backend task that is aborted when the watcher drops
    #[cfg_attr(not(feature = "zookeeper"), allow(dead_code))]
    pub(crate) fn with_pump(
        events: mpsc::UnboundedReceiver<WatchEvent>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            pump: Some(pump),
        }
    }

    /// Next event, `None` once the session is gone
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

impl Drop for TreeWatcher {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode_flags() {
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_sequential());
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(CreateMode::PersistentSequential.is_sequential());
    }

    #[test]
    fn test_credentials_identity_hides_secret() {
        let creds = Credentials::digest("scheduler:s3cret");
        assert_eq!(creds.identity(), "digest:scheduler");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn test_acl_policy_follows_credentials() {
        let mut options = SessionOptions {
            servers: "localhost:2181".to_string(),
            session_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(15),
            credentials: None,
        };
        assert_eq!(options.acl_policy(), AclPolicy::Open);
        options.credentials = Some(Credentials::digest("a:b"));
        assert_eq!(options.acl_policy(), AclPolicy::CreatorAll);
    }
}
