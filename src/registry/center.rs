//! # Registry Center
//!
//! Namespaced key/value registry over a coordination session, with a local
//! tree cache serving reads.
//!
//! Every operation resolves its key into the namespace, issues calls on the
//! live session and returns an explicit [`RegistryResult`]. Reads through
//! [`RegistryCenter::get`] are served from the cache when the key is
//! mirrored and fall through to the service otherwise.
//!
//! ## Lifecycle
//!
//! `init` loads the seed file, connects with retry, ensures the namespace
//! node, applies the seed and starts the cache. `close` stops the cache
//! before the session so the cache never observes a half-closed session.
//! Lifecycle transitions are serialized; operations issued while not
//! started fail with [`RegistryError::NotStarted`].

use crate::config::RegistryConfig;
use crate::coordinator::{
    CoordinationError, CoordinationService, Connector, Coordinator, CreateMode, TxnOp,
};
use crate::error::{RegistryError, RegistryResult};
use crate::logging::log_registry_operation;
use crate::path::Namespace;
use crate::registry::cache::{CacheShutdown, TreeCache};
use crate::registry::capability::{CacheHandle, SessionHandle};
use crate::registry::connector::SessionConnector;
use crate::registry::seed::LocalSeed;
use crate::registry::tree_ops;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ActiveSession {
    coordinator: Coordinator,
    cache: Arc<TreeCache>,
    namespace: Namespace,
}

/// Registry center bound to one configuration
#[derive(Debug)]
pub struct RegistryCenter {
    id: Uuid,
    config: Arc<RegistryConfig>,
    connector: SessionConnector,
    lifecycle: tokio::sync::Mutex<()>,
    active: RwLock<Option<ActiveSession>>,
}

impl RegistryCenter {
    /// Registry center choosing its backend from the server lists
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_connector(config, Connector::Auto)
    }

    /// Registry center using an explicit backend
    pub fn with_connector(config: RegistryConfig, connector: Connector) -> Self {
        let config = Arc::new(config);
        Self {
            id: Uuid::new_v4(),
            connector: SessionConnector::new(Arc::clone(&config), connector),
            config,
            lifecycle: tokio::sync::Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    /// Identifier of this instance, attached to lifecycle logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.active.read().is_some()
    }

    fn session(&self) -> RegistryResult<ActiveSession> {
        self.active.read().clone().ok_or(RegistryError::NotStarted)
    }

    /// Connect, seed and start the cache
    ///
    /// Configuration problems (invalid namespace, missing or malformed seed
    /// file) are reported before any connection is attempted.
    pub async fn init(&self) -> RegistryResult<()> {
        let _guard = self.lifecycle.lock().await;
        if self.is_started() {
            return Err(RegistryError::AlreadyStarted);
        }
        self.config.validate()?;
        let namespace = self.config.namespace()?;
        let seed = self
            .config
            .local_properties_path
            .as_deref()
            .map(LocalSeed::load)
            .transpose()?;

        debug!(
            registry_id = %self.id,
            config = %self.config.sanitized(),
            "Registry center init"
        );
        let coordinator = self.connector.connect().await?;

        match self.open(&coordinator, &namespace, seed.as_ref()).await {
            Ok(cache) => {
                *self.active.write() = Some(ActiveSession {
                    coordinator: coordinator.clone(),
                    cache,
                    namespace: namespace.clone(),
                });
                log_registry_operation(
                    "init",
                    namespace.root(),
                    None,
                    "started",
                    Some(&format!(
                        "registry_id={} session_id={}",
                        self.id,
                        coordinator.session_id()
                    )),
                );
                Ok(())
            }
            Err(e) => {
                warn!(registry_id = %self.id, error = %e, "Registry center init failed, closing session");
                if let Err(close_err) = coordinator.close().await {
                    debug!(error = %close_err, "Session close after failed init reported an error");
                }
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        coordinator: &Coordinator,
        namespace: &Namespace,
        seed: Option<&LocalSeed>,
    ) -> RegistryResult<Arc<TreeCache>> {
        tree_ops::ensure_path(coordinator, namespace.root()).await?;
        if let Some(seed) = seed {
            seed.apply(coordinator, namespace, self.config.overwrite)
                .await?;
        }
        let cache = Arc::new(TreeCache::new(namespace.root()));
        cache.start(coordinator.clone()).await?;
        Ok(cache)
    }

    /// Stop the cache, then end the session
    ///
    /// Closing a registry center that is not started does nothing and
    /// reports [`CacheShutdown::NotRunning`].
    pub async fn close(&self) -> RegistryResult<CacheShutdown> {
        let _guard = self.lifecycle.lock().await;
        let taken = self.active.write().take();
        let Some(active) = taken else {
            return Ok(CacheShutdown::NotRunning);
        };

        let shutdown = active.cache.close(self.config.cache_shutdown_timeout()).await;
        if shutdown == CacheShutdown::TimedOut {
            warn!(registry_id = %self.id, "Closing session while cache worker was still draining");
        }
        active.coordinator.close().await?;
        info!(
            registry_id = %self.id,
            namespace = active.namespace.root(),
            cache_shutdown = ?shutdown,
            "🔒 Registry center closed"
        );
        Ok(shutdown)
    }

    /// Value at `key`, from the cache when mirrored
    pub async fn get(&self, key: &str) -> RegistryResult<Option<String>> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        if let Some(entry) = session.cache.current_data(&full) {
            return Ok(Some(decode(&entry.data)));
        }
        read_direct(&session.coordinator, &full).await
    }

    /// Value at `key`, always read from the service
    pub async fn get_directly(&self, key: &str) -> RegistryResult<Option<String>> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        read_direct(&session.coordinator, &full).await
    }

    /// Child names of `key` as ordered by the service
    pub async fn get_children_keys(&self, key: &str) -> RegistryResult<Vec<String>> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        Ok(session.coordinator.get_children(&full).await?)
    }

    /// Number of children of `key`, zero when absent
    pub async fn get_num_children(&self, key: &str) -> RegistryResult<usize> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        let stat = session.coordinator.exists(&full).await?;
        Ok(stat.map_or(0, |s| usize::try_from(s.num_children).unwrap_or(0)))
    }

    pub async fn is_existed(&self, key: &str) -> RegistryResult<bool> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        Ok(session.coordinator.exists(&full).await?.is_some())
    }

    /// Create `key` with `value` (and missing parents), or update it
    pub async fn persist(&self, key: &str, value: &str) -> RegistryResult<()> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        if session.coordinator.exists(&full).await?.is_none() {
            match tree_ops::create_with_parents(
                &session.coordinator,
                &full,
                value.as_bytes(),
                CreateMode::Persistent,
            )
            .await
            {
                Ok(_) => return Ok(()),
                Err(CoordinationError::NodeExists { .. }) => {
                    debug!(path = %full, "Node created concurrently, updating instead");
                }
                Err(e) => return Err(e.into()),
            }
        }
        update_existing(&session.coordinator, &full, value).await
    }

    /// Replace the value of an existing `key` atomically
    ///
    /// Fails without side effects when `key` does not exist.
    pub async fn update(&self, key: &str, value: &str) -> RegistryResult<()> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        update_existing(&session.coordinator, &full, value).await
    }

    /// Create `key` as an ephemeral node, replacing any existing subtree
    pub async fn persist_ephemeral(&self, key: &str, value: &str) -> RegistryResult<()> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        if session.coordinator.exists(&full).await?.is_some() {
            tree_ops::delete_recursive(&session.coordinator, &full).await?;
        }
        tree_ops::create_with_parents(
            &session.coordinator,
            &full,
            value.as_bytes(),
            CreateMode::Ephemeral,
        )
        .await?;
        Ok(())
    }

    /// Create an empty ephemeral node named `key` plus a sequence suffix
    ///
    /// Returns the generated key.
    pub async fn persist_ephemeral_sequential(&self, key: &str) -> RegistryResult<String> {
        self.create_sequential(key, "", CreateMode::EphemeralSequential)
            .await
    }

    /// Create a persistent node named `key` plus a sequence suffix
    pub async fn persist_sequential(&self, key: &str, value: &str) -> RegistryResult<String> {
        self.create_sequential(key, value, CreateMode::PersistentSequential)
            .await
    }

    async fn create_sequential(
        &self,
        key: &str,
        value: &str,
        mode: CreateMode,
    ) -> RegistryResult<String> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        let created =
            tree_ops::create_with_parents(&session.coordinator, &full, value.as_bytes(), mode)
                .await?;
        Ok(session
            .namespace
            .relativize(&created)
            .map_or_else(|| created.clone(), str::to_string))
    }

    /// Delete `key` and all of its descendants; absent keys are not an error
    pub async fn remove(&self, key: &str) -> RegistryResult<()> {
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        Ok(tree_ops::delete_recursive(&session.coordinator, &full).await?)
    }

    /// Current time as seen by the coordination service
    ///
    /// Touches `key` and reads back its modification time.
    pub async fn get_registry_center_time(&self, key: &str) -> RegistryResult<DateTime<Utc>> {
        self.persist(key, "").await?;
        let session = self.session()?;
        let full = session.namespace.resolve(key)?;
        let stat = session
            .coordinator
            .exists(&full)
            .await?
            .ok_or_else(|| CoordinationError::no_node(&full))?;
        DateTime::from_timestamp_millis(stat.mtime).ok_or_else(|| {
            CoordinationError::Backend(format!("invalid modification time {}", stat.mtime)).into()
        })
    }

    /// Session capability for coordination recipes
    pub fn session_handle(&self) -> RegistryResult<SessionHandle> {
        let session = self.session()?;
        Ok(SessionHandle::new(session.coordinator, session.namespace))
    }

    /// Cache capability for coordination recipes
    pub fn cache_handle(&self) -> RegistryResult<CacheHandle> {
        let session = self.session()?;
        Ok(CacheHandle::new(session.cache, session.namespace))
    }
}

fn decode(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

async fn read_direct(coordinator: &Coordinator, full: &str) -> RegistryResult<Option<String>> {
    match coordinator.get_data(full).await {
        Ok((data, _)) => Ok(Some(decode(&data))),
        Err(CoordinationError::NoNode { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn update_existing(coordinator: &Coordinator, full: &str, value: &str) -> RegistryResult<()> {
    coordinator
        .commit(vec![
            TxnOp::Check {
                path: full.to_string(),
                version: None,
            },
            TxnOp::SetData {
                path: full.to_string(),
                data: value.as_bytes().to_vec(),
                version: None,
            },
        ])
        .await?;
    Ok(())
}
