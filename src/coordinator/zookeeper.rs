//! ZooKeeper coordination backend
//!
//! Uses `zookeeper_client::Client` for async multiplexed sessions.
//! Requires the `zookeeper` feature flag.

use super::error::{CoordinationError, CoordinationResult};
use super::types::{
    CreateMode, NodeStat, SessionOptions, TreeWatcher, TxnOp, TxnResult, WatchEvent,
    WatchEventKind,
};
use super::CoordinationService;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zookeeper_client as zk;

/// Session against a ZooKeeper ensemble
///
/// The client is released on `close`; clones observe the release and report
/// `SessionClosed` from then on.
#[derive(Clone)]
pub struct ZooKeeperSession {
    client: Arc<Mutex<Option<zk::Client>>>,
    creator_only: bool,
    session_id: i64,
}

impl std::fmt::Debug for ZooKeeperSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZooKeeperSession")
            .field("session_id", &format_args!("{:#x}", self.session_id))
            .field("creator_only", &self.creator_only)
            .finish()
    }
}

impl ZooKeeperSession {
    /// Open a session; a single attempt, retries belong to the caller
    pub async fn connect(options: &SessionOptions) -> CoordinationResult<Self> {
        let mut connector = zk::Client::connector();
        connector.session_timeout(options.session_timeout);
        connector.connection_timeout(options.connection_timeout);
        if let Some(credentials) = &options.credentials {
            connector.auth(
                credentials.scheme.clone(),
                credentials.auth.as_bytes().to_vec(),
            );
        }

        let client = connector
            .connect(&options.servers)
            .await
            .map_err(|e| map_error(&options.servers, e))?;
        let session_id = client.session_id().0;

        info!(
            servers = %options.servers,
            session_id = %format_args!("{session_id:#x}"),
            "ZooKeeper session established"
        );

        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
            creator_only: options.credentials.is_some(),
            session_id,
        })
    }

    fn client(&self) -> CoordinationResult<zk::Client> {
        self.client
            .lock()
            .clone()
            .ok_or(CoordinationError::SessionClosed)
    }

    fn acls(&self) -> zk::Acls<'static> {
        if self.creator_only {
            zk::Acls::creator_all()
        } else {
            zk::Acls::anyone_all()
        }
    }

    fn create_mode(mode: CreateMode) -> zk::CreateMode {
        match mode {
            CreateMode::Persistent => zk::CreateMode::Persistent,
            CreateMode::PersistentSequential => zk::CreateMode::PersistentSequential,
            CreateMode::Ephemeral => zk::CreateMode::Ephemeral,
            CreateMode::EphemeralSequential => zk::CreateMode::EphemeralSequential,
        }
    }
}

fn map_error(path: &str, err: zk::Error) -> CoordinationError {
    match err {
        zk::Error::NoNode => CoordinationError::no_node(path),
        zk::Error::NodeExists => CoordinationError::node_exists(path),
        zk::Error::NotEmpty => CoordinationError::NotEmpty {
            path: path.to_string(),
        },
        zk::Error::BadVersion => CoordinationError::BadVersion {
            path: path.to_string(),
        },
        zk::Error::NoAuth => CoordinationError::NoAuth {
            path: path.to_string(),
        },
        zk::Error::NoChildrenForEphemerals => CoordinationError::NoChildrenForEphemerals {
            path: path.to_string(),
        },
        zk::Error::ConnectionLoss => CoordinationError::ConnectionLoss(path.to_string()),
        zk::Error::SessionExpired => CoordinationError::SessionExpired,
        zk::Error::ClientClosed => CoordinationError::SessionClosed,
        other => CoordinationError::Backend(other.to_string()),
    }
}

/// Map one multi-write outcome; results added by newer client versions are
/// reported as backend errors
fn convert_txn_result(result: zk::MultiWriteResult) -> CoordinationResult<TxnResult> {
    match result {
        zk::MultiWriteResult::Check => Ok(TxnResult::Checked),
        zk::MultiWriteResult::Delete => Ok(TxnResult::Deleted),
        zk::MultiWriteResult::Create { path, .. } => Ok(TxnResult::Created { path }),
        zk::MultiWriteResult::SetData { stat } => Ok(TxnResult::DataSet {
            stat: convert_stat(&stat),
        }),
        _ => {
            warn!("Unrecognized multi-write result from coordination service");
            Err(CoordinationError::Backend(
                "unrecognized multi-write result".to_string(),
            ))
        }
    }
}

fn convert_stat(stat: &zk::Stat) -> NodeStat {
    NodeStat {
        czxid: stat.czxid,
        mzxid: stat.mzxid,
        ctime: stat.ctime,
        mtime: stat.mtime,
        version: stat.version,
        cversion: stat.cversion,
        ephemeral_owner: stat.ephemeral_owner,
        data_length: stat.data_length,
        num_children: stat.num_children,
    }
}

impl CoordinationService for ZooKeeperSession {
    async fn exists(&self, path: &str) -> CoordinationResult<Option<NodeStat>> {
        let client = self.client()?;
        let stat = client
            .check_stat(path)
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(stat.as_ref().map(convert_stat))
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, NodeStat)> {
        let client = self.client()?;
        let (data, stat) = client.get_data(path).await.map_err(|e| map_error(path, e))?;
        Ok((data, convert_stat(&stat)))
    }

    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        let client = self.client()?;
        client
            .list_children(path)
            .await
            .map_err(|e| map_error(path, e))
    }

    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordinationResult<String> {
        let client = self.client()?;
        let options = Self::create_mode(mode).with_acls(self.acls());
        let (_stat, sequence) = client
            .create(path, data, &options)
            .await
            .map_err(|e| map_error(path, e))?;
        if mode.is_sequential() {
            Ok(format!("{path}{sequence}"))
        } else {
            Ok(path.to_string())
        }
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> CoordinationResult<NodeStat> {
        let client = self.client()?;
        let stat = client
            .set_data(path, data, version)
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(convert_stat(&stat))
    }

    async fn delete(&self, path: &str, version: Option<i32>) -> CoordinationResult<()> {
        let client = self.client()?;
        client
            .delete(path, version)
            .await
            .map_err(|e| map_error(path, e))
    }

    async fn commit(&self, ops: Vec<TxnOp>) -> CoordinationResult<Vec<TxnResult>> {
        let client = self.client()?;
        let acls = self.acls();
        let mut writer = client.new_multi_writer();
        for op in &ops {
            let added = match op {
                TxnOp::Check { path, version } => {
                    writer.add_check_version(path, version.unwrap_or(-1))
                }
                TxnOp::Create { path, data, mode } => {
                    let options = Self::create_mode(*mode).with_acls(acls.clone());
                    writer.add_create(path, data, &options)
                }
                TxnOp::SetData {
                    path,
                    data,
                    version,
                } => writer.add_set_data(path, data, *version),
                TxnOp::Delete { path, version } => writer.add_delete(path, *version),
            };
            added.map_err(|e| map_error(op.path(), e))?;
        }

        let results = writer.commit().await.map_err(|e| match e {
            zk::MultiWriteError::OperationFailed { index, source } => {
                let path = ops.get(index).map(TxnOp::path).unwrap_or_default();
                CoordinationError::TransactionFailed {
                    index,
                    source: Box::new(map_error(path, source)),
                }
            }
            zk::MultiWriteError::RequestFailed { source } => map_error("/", source),
        })?;

        results.into_iter().map(convert_txn_result).collect()
    }

    async fn watch_tree(&self, root: &str) -> CoordinationResult<TreeWatcher> {
        let client = self.client()?;
        let mut watcher = client
            .watch(root, zk::AddWatchMode::PersistentRecursive)
            .await
            .map_err(|e| map_error(root, e))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let root = root.to_string();
        let pump = tokio::spawn(async move {
            loop {
                let event = watcher.changed().await;
                let kind = match event.event_type {
                    zk::EventType::NodeCreated => WatchEventKind::NodeCreated,
                    zk::EventType::NodeDataChanged => WatchEventKind::NodeDataChanged,
                    zk::EventType::NodeDeleted => WatchEventKind::NodeDeleted,
                    zk::EventType::Session => match event.session_state {
                        zk::SessionState::Expired
                        | zk::SessionState::Closed
                        | zk::SessionState::AuthFailed => {
                            warn!(root = %root, state = ?event.session_state, "Tree watch ended with session");
                            break;
                        }
                        _ => continue,
                    },
                    _ => continue,
                };
                if sender
                    .send(WatchEvent {
                        kind,
                        path: event.path,
                    })
                    .is_err()
                {
                    break;
                }
            }
            debug!(root = %root, "Tree watch pump stopped");
        });

        Ok(TreeWatcher::with_pump(receiver, pump))
    }

    async fn close(&self) -> CoordinationResult<()> {
        let released = self.client.lock().take();
        if released.is_some() {
            info!(
                session_id = %format_args!("{:#x}", self.session_id),
                "ZooKeeper session closed"
            );
        }
        Ok(())
    }

    fn session_id(&self) -> i64 {
        self.session_id
    }

    fn backend_name(&self) -> &'static str {
        "zookeeper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_write_results_map_to_txn_results() {
        assert_eq!(
            convert_txn_result(zk::MultiWriteResult::Check).unwrap(),
            TxnResult::Checked
        );
        assert_eq!(
            convert_txn_result(zk::MultiWriteResult::Delete).unwrap(),
            TxnResult::Deleted
        );
    }
}
