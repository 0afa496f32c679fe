//! # Tree Cache
//!
//! Local mirror of a namespace subtree, fed by a recursive watch.
//!
//! ## Lifecycle
//!
//! ```text
//! Latent --start()--> Started --close()--> Closed
//! ```
//!
//! `start` registers the watch before the initial population walk, so no
//! change made after `start` returns can be missed. A background worker
//! populates the mirror level by level, flips the initialized flag and
//! then applies watch events in service order. `close` signals the worker and
//! waits for it to finish, bounded by a timeout.
//!
//! Readers must tolerate staleness: an entry may be missing (not yet
//! populated) or briefly out of date relative to the service.

use crate::coordinator::{
    CoordinationError, CoordinationResult, CoordinationService, Coordinator, NodeStat, TreeWatcher,
    WatchEvent, WatchEventKind,
};
use crate::error::{RegistryError, RegistryResult};
use crate::path;
use dashmap::DashMap;
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Mirrored node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub stat: NodeStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Latent,
    Started,
    Closed,
}

/// How a cache shutdown completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheShutdown {
    /// The cache was never started or is already closed
    NotRunning,
    /// The worker finished within the timeout
    Drained,
    /// The worker was still running at the deadline and has been aborted
    TimedOut,
}

#[derive(Debug)]
struct CacheWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct Lifecycle {
    state: CacheState,
    worker: Option<CacheWorker>,
}

/// Watch-fed mirror of the subtree under `root`
#[derive(Debug)]
pub struct TreeCache {
    root: String,
    entries: Arc<DashMap<String, CacheEntry>>,
    initialized: Arc<watch::Sender<bool>>,
    lifecycle: Mutex<Lifecycle>,
}

impl TreeCache {
    pub fn new(root: impl Into<String>) -> Self {
        let (initialized, _) = watch::channel(false);
        Self {
            root: root.into(),
            entries: Arc::new(DashMap::new()),
            initialized: Arc::new(initialized),
            lifecycle: Mutex::new(Lifecycle {
                state: CacheState::Latent,
                worker: None,
            }),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn state(&self) -> CacheState {
        self.lifecycle.lock().state
    }

    /// Register the watch and spawn the worker
    pub async fn start(&self, coordinator: Coordinator) -> RegistryResult<()> {
        if self.state() != CacheState::Latent {
            return Err(RegistryError::AlreadyStarted);
        }
        let watcher = coordinator.watch_tree(&self.root).await?;

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != CacheState::Latent {
            return Err(RegistryError::AlreadyStarted);
        }
        let (shutdown, shutdown_rx) = oneshot::channel();
        let worker = CacheRunner {
            coordinator,
            root: self.root.clone(),
            entries: Arc::clone(&self.entries),
            initialized: Arc::clone(&self.initialized),
        };
        let handle = tokio::spawn(worker.run(watcher, shutdown_rx));
        lifecycle.worker = Some(CacheWorker { shutdown, handle });
        lifecycle.state = CacheState::Started;
        debug!(root = %self.root, "Tree cache started");
        Ok(())
    }

    /// Stop the worker and wait up to `timeout` for it to finish
    pub async fn close(&self, timeout: Duration) -> CacheShutdown {
        let worker = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.state = CacheState::Closed;
            lifecycle.worker.take()
        };
        let Some(CacheWorker {
            shutdown,
            mut handle,
        }) = worker
        else {
            return CacheShutdown::NotRunning;
        };

        // The worker may already have stopped on its own
        let _ = shutdown.send(());
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => CacheShutdown::Drained,
            Err(_) => {
                handle.abort();
                warn!(
                    root = %self.root,
                    timeout_ms = timeout.as_millis() as u64,
                    "Tree cache did not drain in time, aborted"
                );
                CacheShutdown::TimedOut
            }
        };
        self.entries.clear();
        debug!(root = %self.root, outcome = ?outcome, "Tree cache closed");
        outcome
    }

    /// Mirrored node at a full path
    pub fn current_data(&self, full_path: &str) -> Option<CacheEntry> {
        self.entries.get(full_path).map(|entry| entry.value().clone())
    }

    /// Names of mirrored children of a full path, in creation order
    pub fn current_children(&self, full_path: &str) -> Vec<String> {
        let mut children: Vec<(i64, String)> = self
            .entries
            .iter()
            .filter(|entry| path::parent(entry.key()) == Some(full_path))
            .map(|entry| (entry.stat.czxid, path::node_name(entry.key()).to_string()))
            .collect();
        children.sort();
        children.into_iter().map(|(_, name)| name).collect()
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    /// Wait until the initial population has completed
    pub async fn wait_initialized(&self, timeout: Duration) -> bool {
        let mut receiver = self.initialized.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State owned by the background worker
struct CacheRunner {
    coordinator: Coordinator,
    root: String,
    entries: Arc<DashMap<String, CacheEntry>>,
    initialized: Arc<watch::Sender<bool>>,
}

impl CacheRunner {
    async fn run(self, mut watcher: TreeWatcher, mut shutdown: oneshot::Receiver<()>) {
        tokio::select! {
            biased;
            _ = &mut shutdown => return,
            populated = self.populate() => match populated {
                Ok(count) => {
                    self.initialized.send_replace(true);
                    info!(root = %self.root, nodes = count, "🗂️ Tree cache initialized");
                }
                Err(e) if e.is_session_terminal() => {
                    warn!(root = %self.root, error = %e, "Session ended during cache population");
                    return;
                }
                Err(e) => {
                    warn!(root = %self.root, error = %e, "Cache population incomplete, continuing with watch events");
                }
            },
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = watcher.next() => match event {
                    Some(event) => {
                        if let Err(e) = self.apply(&event).await {
                            if e.is_session_terminal() {
                                warn!(root = %self.root, error = %e, "Session ended, tree cache stopping");
                                break;
                            }
                            warn!(path = %event.path, error = %e, "Failed to refresh cached node");
                        }
                    }
                    None => {
                        debug!(root = %self.root, "Watch channel closed");
                        break;
                    }
                },
            }
        }
    }

    async fn populate(&self) -> CoordinationResult<usize> {
        let mut level = vec![self.root.clone()];
        let mut count = 0;
        while !level.is_empty() {
            let reads = try_join_all(level.iter().map(|node| self.read_node(node))).await?;
            let mut next = Vec::new();
            for (node, read) in level.iter().zip(reads) {
                let Some((data, stat, children)) = read else {
                    continue;
                };
                self.store(node, data, stat);
                count += 1;
                next.extend(children.iter().map(|child| path::join(node, child)));
            }
            level = next;
        }
        Ok(count)
    }

    /// Data, stat and children of a node; `None` if it vanished meanwhile
    /// or this session may not read it
    async fn read_node(
        &self,
        node: &str,
    ) -> CoordinationResult<Option<(Vec<u8>, NodeStat, Vec<String>)>> {
        let (data, stat) = match self.coordinator.get_data(node).await {
            Ok(found) => found,
            Err(CoordinationError::NoNode { .. }) => return Ok(None),
            Err(CoordinationError::NoAuth { .. }) => {
                debug!(path = %node, "Skipping node without read access");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let children = match self.coordinator.get_children(node).await {
            Ok(children) => children,
            Err(CoordinationError::NoNode { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Some((data, stat, children)))
    }

    async fn apply(&self, event: &WatchEvent) -> CoordinationResult<()> {
        match event.kind {
            WatchEventKind::NodeCreated | WatchEventKind::NodeDataChanged => {
                match self.coordinator.get_data(&event.path).await {
                    Ok((data, stat)) => self.store(&event.path, data, stat),
                    Err(CoordinationError::NoNode { .. }) => self.evict(&event.path),
                    Err(CoordinationError::NoAuth { .. }) => {
                        debug!(path = %event.path, "Skipping node without read access");
                    }
                    Err(e) => return Err(e),
                }
            }
            WatchEventKind::NodeDeleted => self.evict(&event.path),
        }
        Ok(())
    }

    fn store(&self, full_path: &str, data: Vec<u8>, stat: NodeStat) {
        // Events can overtake each other's reads; never regress a node
        if let Some(existing) = self.entries.get(full_path) {
            if existing.stat.czxid == stat.czxid && existing.stat.mzxid > stat.mzxid {
                return;
            }
        }
        self.entries.insert(
            full_path.to_string(),
            CacheEntry {
                path: full_path.to_string(),
                data,
                stat,
            },
        );
    }

    fn evict(&self, full_path: &str) {
        self.entries
            .retain(|cached, _| !path::is_within(full_path, cached));
    }
}
