//! In-process coordination ensemble
//!
//! A complete hierarchical store with the node, session, ACL, watch and
//! transaction semantics of a ZooKeeper-style ensemble, held in memory. Any
//! number of sessions may share one [`MemoryEnsemble`], which makes it the
//! backend for tests and for local development without an ensemble.
//!
//! Fault injection (`fail_next_connects`, `inject_error`, `set_latency`)
//! lets callers exercise retry and error-policy paths deterministically.

use super::error::{CoordinationError, CoordinationResult};
use super::types::{
    AclPolicy, CreateMode, NodeStat, SessionOptions, TreeWatcher, TxnOp, TxnResult, WatchEvent,
    WatchEventKind,
};
use super::CoordinationService;
use crate::constants::{ROOT_PATH, SEQUENCE_SUFFIX_WIDTH};
use crate::error::RegistryError;
use crate::path;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeAcl {
    Open,
    Creator(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    stat: NodeStat,
    children: Vec<String>,
    acl: NodeAcl,
}

impl Node {
    fn new(data: Vec<u8>, acl: NodeAcl, zxid: i64, ephemeral_owner: i64) -> Self {
        let now = Utc::now().timestamp_millis();
        let data_length = i32::try_from(data.len()).unwrap_or(i32::MAX);
        Self {
            data,
            stat: NodeStat {
                czxid: zxid,
                mzxid: zxid,
                ctime: now,
                mtime: now,
                version: 0,
                cversion: 0,
                ephemeral_owner,
                data_length,
                num_children: 0,
            },
            children: Vec::new(),
            acl,
        }
    }

    fn authorize(&self, path: &str, identity: Option<&str>) -> CoordinationResult<()> {
        match &self.acl {
            NodeAcl::Open => Ok(()),
            NodeAcl::Creator(owner) if identity == Some(owner.as_str()) => Ok(()),
            NodeAcl::Creator(_) => Err(CoordinationError::NoAuth {
                path: path.to_string(),
            }),
        }
    }
}

/// Identity of the caller mutating the tree
#[derive(Debug, Clone)]
struct Caller {
    session_id: i64,
    identity: Option<String>,
    acl: AclPolicy,
}

impl Caller {
    fn node_acl(&self) -> NodeAcl {
        match (&self.acl, &self.identity) {
            (AclPolicy::CreatorAll, Some(identity)) => NodeAcl::Creator(identity.clone()),
            _ => NodeAcl::Open,
        }
    }
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: HashMap<String, Node>,
    zxid: i64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_PATH.to_string(), Node::new(Vec::new(), NodeAcl::Open, 0, 0));
        Self { nodes, zxid: 0 }
    }

    fn node(&self, path: &str) -> CoordinationResult<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| CoordinationError::no_node(path))
    }

    fn check_version(path: &str, node: &Node, version: Option<i32>) -> CoordinationResult<()> {
        match version {
            Some(expected) if expected != node.stat.version => Err(CoordinationError::BadVersion {
                path: path.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check(&self, path: &str, version: Option<i32>) -> CoordinationResult<()> {
        let node = self.node(path)?;
        Self::check_version(path, node, version)
    }

    fn create(
        &mut self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        caller: &Caller,
        events: &mut Vec<WatchEvent>,
    ) -> CoordinationResult<String> {
        check_path(path)?;
        let parent_path = match path::parent(path) {
            Some(parent) => parent.to_string(),
            None => return Err(CoordinationError::node_exists(path)),
        };
        let parent = self
            .nodes
            .get_mut(&parent_path)
            .ok_or_else(|| CoordinationError::no_node(path))?;
        if parent.stat.ephemeral_owner != 0 {
            return Err(CoordinationError::NoChildrenForEphemerals { path: parent_path });
        }
        parent.authorize(&parent_path, caller.identity.as_deref())?;

        // Sequence suffixes come from the parent's child version, as on the service
        let actual = if mode.is_sequential() {
            let sequence = parent.stat.cversion;
            format!("{path}{sequence:0width$}", width = SEQUENCE_SUFFIX_WIDTH)
        } else {
            path.to_string()
        };
        if parent.children.iter().any(|c| c == path::node_name(&actual)) {
            return Err(CoordinationError::node_exists(actual));
        }
        parent.children.push(path::node_name(&actual).to_string());
        parent.stat.cversion += 1;
        parent.stat.num_children += 1;

        self.zxid += 1;
        let owner = if mode.is_ephemeral() {
            caller.session_id
        } else {
            0
        };
        self.nodes.insert(
            actual.clone(),
            Node::new(data.to_vec(), caller.node_acl(), self.zxid, owner),
        );
        events.push(WatchEvent {
            kind: WatchEventKind::NodeCreated,
            path: actual.clone(),
        });
        Ok(actual)
    }

    fn set_data(
        &mut self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
        caller: &Caller,
        events: &mut Vec<WatchEvent>,
    ) -> CoordinationResult<NodeStat> {
        let zxid = self.zxid + 1;
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::no_node(path))?;
        node.authorize(path, caller.identity.as_deref())?;
        Self::check_version(path, node, version)?;

        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = Utc::now().timestamp_millis();
        node.stat.data_length = i32::try_from(data.len()).unwrap_or(i32::MAX);
        let stat = node.stat;
        self.zxid = zxid;
        events.push(WatchEvent {
            kind: WatchEventKind::NodeDataChanged,
            path: path.to_string(),
        });
        Ok(stat)
    }

    fn delete(
        &mut self,
        path: &str,
        version: Option<i32>,
        caller: &Caller,
        events: &mut Vec<WatchEvent>,
    ) -> CoordinationResult<()> {
        let parent_path = match path::parent(path) {
            Some(parent) => parent.to_string(),
            None => {
                return Err(CoordinationError::InvalidPath {
                    path: path.to_string(),
                    reason: "the root node cannot be deleted".to_string(),
                })
            }
        };
        let node = self.node(path)?;
        Self::check_version(path, node, version)?;
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty {
                path: path.to_string(),
            });
        }
        if let Some(parent) = self.nodes.get(&parent_path) {
            parent.authorize(&parent_path, caller.identity.as_deref())?;
        }
        self.unlink(path, events);
        Ok(())
    }

    /// Remove a childless node without version or ACL checks
    fn unlink(&mut self, path: &str, events: &mut Vec<WatchEvent>) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        self.zxid += 1;
        if let Some(parent) = path::parent(path).and_then(|p| self.nodes.get_mut(p)) {
            let name = path::node_name(path);
            parent.children.retain(|child| child != name);
            parent.stat.cversion += 1;
            parent.stat.num_children -= 1;
        }
        events.push(WatchEvent {
            kind: WatchEventKind::NodeDeleted,
            path: path.to_string(),
        });
    }

    fn apply(
        &mut self,
        op: &TxnOp,
        caller: &Caller,
        events: &mut Vec<WatchEvent>,
    ) -> CoordinationResult<TxnResult> {
        match op {
            TxnOp::Check { path, version } => {
                self.check(path, *version)?;
                Ok(TxnResult::Checked)
            }
            TxnOp::Create { path, data, mode } => {
                let path = self.create(path, data, *mode, caller, events)?;
                Ok(TxnResult::Created { path })
            }
            TxnOp::SetData {
                path,
                data,
                version,
            } => {
                let stat = self.set_data(path, data, *version, caller, events)?;
                Ok(TxnResult::DataSet { stat })
            }
            TxnOp::Delete { path, version } => {
                self.delete(path, *version, caller, events)?;
                Ok(TxnResult::Deleted)
            }
        }
    }

    fn ephemerals_of(&self, session_id: i64) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn check_path(path: &str) -> CoordinationResult<()> {
    path::validate(path).map_err(|e| match e {
        RegistryError::InvalidPath { path, reason } => CoordinationError::InvalidPath { path, reason },
        other => CoordinationError::Backend(other.to_string()),
    })
}

#[derive(Debug)]
struct WatchRegistration {
    session_id: i64,
    root: String,
    sender: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_connects: u32,
    pending_errors: VecDeque<CoordinationError>,
    latency: Duration,
}

#[derive(Debug)]
struct EnsembleState {
    tree: RwLock<Tree>,
    sessions: Mutex<HashMap<i64, Option<String>>>,
    watches: Mutex<Vec<WatchRegistration>>,
    faults: Mutex<Faults>,
    next_session_id: AtomicI64,
    connect_attempts: AtomicU64,
}

/// Shared in-memory ensemble
#[derive(Debug, Clone)]
pub struct MemoryEnsemble {
    state: Arc<EnsembleState>,
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self {
            state: Arc::new(EnsembleState {
                tree: RwLock::new(Tree::new()),
                sessions: Mutex::new(HashMap::new()),
                watches: Mutex::new(Vec::new()),
                faults: Mutex::new(Faults::default()),
                next_session_id: AtomicI64::new(1),
                connect_attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Open a session against this ensemble
    pub async fn connect(&self, options: &SessionOptions) -> CoordinationResult<MemorySession> {
        self.state.connect_attempts.fetch_add(1, Ordering::Relaxed);
        {
            let mut faults = self.state.faults.lock();
            if faults.failing_connects > 0 {
                faults.failing_connects -= 1;
                return Err(CoordinationError::ConnectionLoss(format!(
                    "connection to {} refused",
                    options.servers
                )));
            }
        }

        let id = self.state.next_session_id.fetch_add(1, Ordering::Relaxed);
        let identity = options.credentials.as_ref().map(|c| c.identity());
        self.state.sessions.lock().insert(id, identity.clone());
        debug!(session_id = id, "Memory session established");

        Ok(MemorySession {
            ensemble: self.clone(),
            caller: Caller {
                session_id: id,
                identity,
                acl: options.acl_policy(),
            },
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Refuse the next `count` connection attempts with a connection loss
    pub fn fail_next_connects(&self, count: u32) {
        self.state.faults.lock().failing_connects = count;
    }

    /// Fail the next operation issued by any session with `error`
    pub fn inject_error(&self, error: CoordinationError) {
        self.state.faults.lock().pending_errors.push_back(error);
    }

    /// Delay every subsequent operation by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.faults.lock().latency = latency;
    }

    /// Expire a session as the service would after a missed heartbeat
    pub fn expire_session(&self, session_id: i64) -> bool {
        let existed = self.state.sessions.lock().remove(&session_id).is_some();
        if existed {
            info!(session_id = session_id, "Memory session expired");
            self.end_session(session_id);
        }
        existed
    }

    pub fn active_sessions(&self) -> usize {
        self.state.sessions.lock().len()
    }

    pub fn connect_attempts(&self) -> u64 {
        self.state.connect_attempts.load(Ordering::Relaxed)
    }

    /// Number of live recursive watches
    pub fn watch_count(&self) -> usize {
        let mut watches = self.state.watches.lock();
        watches.retain(|w| !w.sender.is_closed());
        watches.len()
    }

    /// Number of nodes including the root
    pub fn node_count(&self) -> usize {
        self.state.tree.read().nodes.len()
    }

    /// Read a node bypassing sessions and ACLs
    pub fn peek(&self, path: &str) -> Option<(Vec<u8>, NodeStat)> {
        self.state
            .tree
            .read()
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
    }

    fn end_session(&self, session_id: i64) {
        self.state
            .watches
            .lock()
            .retain(|w| w.session_id != session_id);

        let mut events = Vec::new();
        {
            let mut tree = self.state.tree.write();
            for path in tree.ephemerals_of(session_id) {
                tree.unlink(&path, &mut events);
            }
        }
        self.dispatch(events);
    }

    fn dispatch(&self, events: Vec<WatchEvent>) {
        if events.is_empty() {
            return;
        }
        let mut watches = self.state.watches.lock();
        watches.retain(|registration| {
            events
                .iter()
                .filter(|event| path::is_within(&registration.root, &event.path))
                .all(|event| registration.sender.send(event.clone()).is_ok())
        });
    }
}

/// One session against a [`MemoryEnsemble`]
#[derive(Debug, Clone)]
pub struct MemorySession {
    ensemble: MemoryEnsemble,
    caller: Caller,
    closed: Arc<AtomicBool>,
}

impl MemorySession {
    async fn admit(&self) -> CoordinationResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::SessionClosed);
        }
        let (latency, injected) = {
            let mut faults = self.ensemble.state.faults.lock();
            (faults.latency, faults.pending_errors.pop_front())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::SessionClosed);
        }
        if !self
            .ensemble
            .state
            .sessions
            .lock()
            .contains_key(&self.caller.session_id)
        {
            return Err(CoordinationError::SessionExpired);
        }
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tree, &mut Vec<WatchEvent>) -> CoordinationResult<T>,
    ) -> CoordinationResult<T> {
        let mut events = Vec::new();
        let result = {
            let mut tree = self.ensemble.state.tree.write();
            f(&mut tree, &mut events)
        };
        if result.is_ok() {
            self.ensemble.dispatch(events);
        }
        result
    }
}

impl CoordinationService for MemorySession {
    async fn exists(&self, path: &str) -> CoordinationResult<Option<NodeStat>> {
        self.admit().await?;
        check_path(path)?;
        Ok(self
            .ensemble
            .state
            .tree
            .read()
            .nodes
            .get(path)
            .map(|node| node.stat))
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, NodeStat)> {
        self.admit().await?;
        check_path(path)?;
        let tree = self.ensemble.state.tree.read();
        let node = tree.node(path)?;
        node.authorize(path, self.caller.identity.as_deref())?;
        Ok((node.data.clone(), node.stat))
    }

    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        self.admit().await?;
        check_path(path)?;
        let tree = self.ensemble.state.tree.read();
        let node = tree.node(path)?;
        node.authorize(path, self.caller.identity.as_deref())?;
        Ok(node.children.clone())
    }

    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordinationResult<String> {
        self.admit().await?;
        self.mutate(|tree, events| tree.create(path, data, mode, &self.caller, events))
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> CoordinationResult<NodeStat> {
        self.admit().await?;
        check_path(path)?;
        self.mutate(|tree, events| tree.set_data(path, data, version, &self.caller, events))
    }

    async fn delete(&self, path: &str, version: Option<i32>) -> CoordinationResult<()> {
        self.admit().await?;
        check_path(path)?;
        self.mutate(|tree, events| tree.delete(path, version, &self.caller, events))
    }

    async fn commit(&self, ops: Vec<TxnOp>) -> CoordinationResult<Vec<TxnResult>> {
        self.admit().await?;
        for op in &ops {
            check_path(op.path())?;
        }
        self.mutate(|tree, events| {
            let mut staged = tree.clone();
            let mut staged_events = Vec::new();
            let mut results = Vec::with_capacity(ops.len());
            for (index, op) in ops.iter().enumerate() {
                let result = staged
                    .apply(op, &self.caller, &mut staged_events)
                    .map_err(|source| CoordinationError::TransactionFailed {
                        index,
                        source: Box::new(source),
                    })?;
                results.push(result);
            }
            *tree = staged;
            events.extend(staged_events);
            Ok(results)
        })
    }

    async fn watch_tree(&self, root: &str) -> CoordinationResult<TreeWatcher> {
        self.admit().await?;
        check_path(root)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.ensemble.state.watches.lock().push(WatchRegistration {
            session_id: self.caller.session_id,
            root: root.to_string(),
            sender,
        });
        Ok(TreeWatcher::new(receiver))
    }

    async fn close(&self) -> CoordinationResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let existed = self
            .ensemble
            .state
            .sessions
            .lock()
            .remove(&self.caller.session_id)
            .is_some();
        if existed {
            self.ensemble.end_session(self.caller.session_id);
        }
        debug!(session_id = self.caller.session_id, "Memory session closed");
        Ok(())
    }

    fn session_id(&self) -> i64 {
        self.caller.session_id
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
