//! # Coordination Backends
//!
//! The seam between the registry center and the coordination service.
//!
//! ## Architecture
//!
//! ```text
//! Coordinator (enum)              <- Zero-cost dispatch, no vtable
//!   ├── Memory(MemorySession)     <- In-process ensemble (tests, local development)
//!   └── ZooKeeper(ZooKeeperSession) <- Network ensemble, `zookeeper` feature
//! ```
//!
//! Every backend implements [`CoordinationService`]. Paths handed to a backend
//! are full tree paths; namespacing is applied by the registry layer.

pub mod error;
pub mod memory;
pub mod types;

#[cfg(feature = "zookeeper")]
pub mod zookeeper;

pub use error::{CoordinationError, CoordinationResult};
pub use memory::{MemoryEnsemble, MemorySession};
pub use types::{
    AclPolicy, CreateMode, Credentials, NodeStat, SessionOptions, TreeWatcher, TxnOp, TxnResult,
    WatchEvent, WatchEventKind,
};

#[cfg(feature = "zookeeper")]
pub use self::zookeeper::ZooKeeperSession;

use crate::constants::MEMORY_SERVER_PREFIX;
use crate::error::RegistryResult;
use std::future::Future;

/// Trait defining coordination-service operations
///
/// Implemented by concrete session types. One value represents one live
/// session; clones share it.
pub trait CoordinationService: Send + Sync {
    /// Stat of the node at `path`, `None` when absent
    fn exists(
        &self,
        path: &str,
    ) -> impl Future<Output = CoordinationResult<Option<NodeStat>>> + Send;

    /// Data and stat of the node at `path`
    fn get_data(
        &self,
        path: &str,
    ) -> impl Future<Output = CoordinationResult<(Vec<u8>, NodeStat)>> + Send;

    /// Names of the immediate children of `path`
    fn get_children(
        &self,
        path: &str,
    ) -> impl Future<Output = CoordinationResult<Vec<String>>> + Send;

    /// Create a node whose parent exists; returns the actual path, which
    /// differs from `path` for sequential modes
    fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> impl Future<Output = CoordinationResult<String>> + Send;

    /// Replace node data, optionally only at an expected version
    fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> impl Future<Output = CoordinationResult<NodeStat>> + Send;

    /// Delete a childless node, optionally only at an expected version
    fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> impl Future<Output = CoordinationResult<()>> + Send;

    /// Apply every operation or none of them
    fn commit(
        &self,
        ops: Vec<TxnOp>,
    ) -> impl Future<Output = CoordinationResult<Vec<TxnResult>>> + Send;

    /// Persistent recursive watch on `root` and everything beneath it
    fn watch_tree(&self, root: &str)
        -> impl Future<Output = CoordinationResult<TreeWatcher>> + Send;

    /// End the session, removing its ephemeral nodes and watches
    fn close(&self) -> impl Future<Output = CoordinationResult<()>> + Send;

    fn session_id(&self) -> i64;

    /// Get the name of the backend
    fn backend_name(&self) -> &'static str;
}

/// Live session against one of the supported backends
#[derive(Debug, Clone)]
pub enum Coordinator {
    Memory(MemorySession),

    /// ZooKeeper client (boxed to reduce enum size)
    #[cfg(feature = "zookeeper")]
    ZooKeeper(Box<ZooKeeperSession>),
}

impl CoordinationService for Coordinator {
    async fn exists(&self, path: &str) -> CoordinationResult<Option<NodeStat>> {
        match self {
            Self::Memory(s) => s.exists(path).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.exists(path).await,
        }
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, NodeStat)> {
        match self {
            Self::Memory(s) => s.get_data(path).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.get_data(path).await,
        }
    }

    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        match self {
            Self::Memory(s) => s.get_children(path).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.get_children(path).await,
        }
    }

    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordinationResult<String> {
        match self {
            Self::Memory(s) => s.create(path, data, mode).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.create(path, data, mode).await,
        }
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> CoordinationResult<NodeStat> {
        match self {
            Self::Memory(s) => s.set_data(path, data, version).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.set_data(path, data, version).await,
        }
    }

    async fn delete(&self, path: &str, version: Option<i32>) -> CoordinationResult<()> {
        match self {
            Self::Memory(s) => s.delete(path, version).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.delete(path, version).await,
        }
    }

    async fn commit(&self, ops: Vec<TxnOp>) -> CoordinationResult<Vec<TxnResult>> {
        match self {
            Self::Memory(s) => s.commit(ops).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.commit(ops).await,
        }
    }

    async fn watch_tree(&self, root: &str) -> CoordinationResult<TreeWatcher> {
        match self {
            Self::Memory(s) => s.watch_tree(root).await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.watch_tree(root).await,
        }
    }

    async fn close(&self) -> CoordinationResult<()> {
        match self {
            Self::Memory(s) => s.close().await,
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.close().await,
        }
    }

    fn session_id(&self) -> i64 {
        match self {
            Self::Memory(s) => s.session_id(),
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.session_id(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(s) => s.backend_name(),
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper(s) => s.backend_name(),
        }
    }
}

/// Chooses the backend a registry center opens its session against
#[derive(Debug, Clone, Default)]
pub enum Connector {
    /// In-memory ensemble for `memory:` server lists, ZooKeeper otherwise
    #[default]
    Auto,
    /// A specific, possibly shared, in-memory ensemble
    Memory(MemoryEnsemble),
    /// A ZooKeeper ensemble at the configured server lists
    #[cfg(feature = "zookeeper")]
    ZooKeeper,
}

impl Connector {
    pub fn memory(ensemble: MemoryEnsemble) -> Self {
        Self::Memory(ensemble)
    }

    /// Resolve `Auto` against the configured server lists
    pub fn resolve(&self, server_lists: &str) -> RegistryResult<Connector> {
        match self {
            Self::Auto if server_lists.starts_with(MEMORY_SERVER_PREFIX) => {
                Ok(Self::Memory(MemoryEnsemble::new()))
            }
            #[cfg(feature = "zookeeper")]
            Self::Auto => Ok(Self::ZooKeeper),
            #[cfg(not(feature = "zookeeper"))]
            Self::Auto => Err(crate::error::RegistryError::config_error(format!(
                "server lists '{server_lists}' require the `zookeeper` feature"
            ))),
            other => Ok(other.clone()),
        }
    }

    /// Make a single connection attempt
    pub async fn connect(&self, options: &SessionOptions) -> CoordinationResult<Coordinator> {
        match self {
            Self::Memory(ensemble) => ensemble.connect(options).await.map(Coordinator::Memory),
            #[cfg(feature = "zookeeper")]
            Self::ZooKeeper => ZooKeeperSession::connect(options)
                .await
                .map(|session| Coordinator::ZooKeeper(Box::new(session))),
            Self::Auto => Err(CoordinationError::Backend(
                "connector must be resolved before connecting".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolves_memory_prefix() {
        let resolved = Connector::Auto.resolve("memory:local").unwrap();
        assert!(matches!(resolved, Connector::Memory(_)));
    }

    #[cfg(not(feature = "zookeeper"))]
    #[test]
    fn test_auto_without_zookeeper_feature_is_misconfiguration() {
        let err = Connector::Auto.resolve("localhost:2181").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_memory_backend() {
        let ensemble = MemoryEnsemble::new();
        let options = SessionOptions {
            servers: "memory:dispatch".to_string(),
            session_timeout: std::time::Duration::from_secs(60),
            connection_timeout: std::time::Duration::from_secs(15),
            credentials: None,
        };
        let coordinator = Connector::memory(ensemble.clone())
            .connect(&options)
            .await
            .unwrap();
        assert_eq!(coordinator.backend_name(), "memory");
        coordinator
            .create("/dispatched", b"ok", CreateMode::Persistent)
            .await
            .unwrap();
        assert_eq!(ensemble.peek("/dispatched").unwrap().0, b"ok");
    }
}
