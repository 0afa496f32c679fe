//! Narrow handles for higher-level coordination recipes
//!
//! Leader latches, locks and similar recipes need the live session or the
//! mirror, but not the whole registry center. Both handles stay scoped to
//! the namespace and become unusable once the registry center is closed.

use crate::coordinator::{
    CoordinationError, CoordinationService, Coordinator, CreateMode, NodeStat,
};
use crate::error::RegistryResult;
use crate::path::Namespace;
use crate::registry::cache::{CacheEntry, TreeCache};
use crate::registry::tree_ops;
use std::sync::Arc;
use std::time::Duration;

/// Session capability scoped to a namespace
#[derive(Debug, Clone)]
pub struct SessionHandle {
    coordinator: Coordinator,
    namespace: Namespace,
}

impl SessionHandle {
    pub(crate) fn new(coordinator: Coordinator, namespace: Namespace) -> Self {
        Self {
            coordinator,
            namespace,
        }
    }

    pub fn session_id(&self) -> i64 {
        self.coordinator.session_id()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Create `key` (and missing parents); returns the created key, which
    /// carries the generated suffix for sequential modes
    pub async fn create(&self, key: &str, data: &[u8], mode: CreateMode) -> RegistryResult<String> {
        let full = self.namespace.resolve(key)?;
        let created = tree_ops::create_with_parents(&self.coordinator, &full, data, mode).await?;
        Ok(self.relative(created))
    }

    pub async fn exists(&self, key: &str) -> RegistryResult<Option<NodeStat>> {
        let full = self.namespace.resolve(key)?;
        Ok(self.coordinator.exists(&full).await?)
    }

    pub async fn data(&self, key: &str) -> RegistryResult<Option<(Vec<u8>, NodeStat)>> {
        let full = self.namespace.resolve(key)?;
        match self.coordinator.get_data(&full).await {
            Ok(found) => Ok(Some(found)),
            Err(CoordinationError::NoNode { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Child names sorted lexicographically, which orders sequential nodes
    pub async fn children(&self, key: &str) -> RegistryResult<Vec<String>> {
        let full = self.namespace.resolve(key)?;
        let mut children = self.coordinator.get_children(&full).await?;
        children.sort();
        Ok(children)
    }

    /// Delete `key` and everything beneath it
    pub async fn delete(&self, key: &str) -> RegistryResult<()> {
        let full = self.namespace.resolve(key)?;
        Ok(tree_ops::delete_recursive(&self.coordinator, &full).await?)
    }

    /// Delete a childless `key` only if it is still at `version`
    pub async fn delete_version(&self, key: &str, version: i32) -> RegistryResult<()> {
        let full = self.namespace.resolve(key)?;
        Ok(self.coordinator.delete(&full, Some(version)).await?)
    }

    fn relative(&self, full: String) -> String {
        match self.namespace.relativize(&full) {
            Some(relative) => relative.to_string(),
            None => full,
        }
    }
}

/// Read-only view of the tree cache scoped to a namespace
#[derive(Debug, Clone)]
pub struct CacheHandle {
    cache: Arc<TreeCache>,
    namespace: Namespace,
}

impl CacheHandle {
    pub(crate) fn new(cache: Arc<TreeCache>, namespace: Namespace) -> Self {
        Self { cache, namespace }
    }

    pub fn current_data(&self, key: &str) -> RegistryResult<Option<CacheEntry>> {
        let full = self.namespace.resolve(key)?;
        Ok(self.cache.current_data(&full))
    }

    pub fn current_children(&self, key: &str) -> RegistryResult<Vec<String>> {
        let full = self.namespace.resolve(key)?;
        Ok(self.cache.current_children(&full))
    }

    pub fn is_initialized(&self) -> bool {
        self.cache.is_initialized()
    }

    pub async fn wait_initialized(&self, timeout: Duration) -> bool {
        self.cache.wait_initialized(timeout).await
    }
}
