//! Multi-call tree operations built from single coordination calls

use crate::coordinator::{CoordinationError, CoordinationResult, CoordinationService, CreateMode};
use crate::path;
use tracing::debug;

const DELETE_ATTEMPTS: usize = 3;

/// Create `path`, creating missing ancestors as empty persistent nodes
///
/// Ancestors created concurrently by another client are accepted.
pub async fn create_with_parents<C: CoordinationService>(
    coordinator: &C,
    full_path: &str,
    data: &[u8],
    mode: CreateMode,
) -> CoordinationResult<String> {
    match coordinator.create(full_path, data, mode).await {
        Err(CoordinationError::NoNode { .. }) => {
            ensure_ancestors(coordinator, full_path).await?;
            coordinator.create(full_path, data, mode).await
        }
        other => other,
    }
}

/// Create every missing ancestor of `path`
pub async fn ensure_ancestors<C: CoordinationService>(
    coordinator: &C,
    full_path: &str,
) -> CoordinationResult<()> {
    for ancestor in path::ancestors(full_path) {
        match coordinator.create(ancestor, &[], CreateMode::Persistent).await {
            Ok(_) | Err(CoordinationError::NodeExists { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Create a persistent node if it is missing
pub async fn ensure_path<C: CoordinationService>(
    coordinator: &C,
    full_path: &str,
) -> CoordinationResult<()> {
    if full_path == crate::constants::ROOT_PATH {
        return Ok(());
    }
    match create_with_parents(coordinator, full_path, &[], CreateMode::Persistent).await {
        Ok(_) | Err(CoordinationError::NodeExists { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// `root` followed by all of its descendants, parents before children
pub async fn collect_subtree<C: CoordinationService>(
    coordinator: &C,
    root: &str,
) -> CoordinationResult<Vec<String>> {
    let mut ordered = vec![root.to_string()];
    let mut cursor = 0;
    while cursor < ordered.len() {
        let current = ordered[cursor].clone();
        match coordinator.get_children(&current).await {
            Ok(children) => {
                ordered.extend(children.iter().map(|child| path::join(&current, child)));
            }
            Err(CoordinationError::NoNode { .. }) if cursor == 0 => return Ok(Vec::new()),
            Err(CoordinationError::NoNode { .. }) => {}
            Err(e) => return Err(e),
        }
        cursor += 1;
    }
    Ok(ordered)
}

/// Delete `root` and all of its descendants; an absent root is not an error
pub async fn delete_recursive<C: CoordinationService>(
    coordinator: &C,
    root: &str,
) -> CoordinationResult<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match delete_subtree_once(coordinator, root).await {
            Err(CoordinationError::NotEmpty { path }) if attempt < DELETE_ATTEMPTS => {
                debug!(path = %path, attempt = attempt, "Children appeared during delete, retrying");
            }
            result => return result,
        }
    }
}

async fn delete_subtree_once<C: CoordinationService>(
    coordinator: &C,
    root: &str,
) -> CoordinationResult<()> {
    let subtree = collect_subtree(coordinator, root).await?;
    for node in subtree.iter().rev() {
        match coordinator.delete(node, None).await {
            Ok(()) | Err(CoordinationError::NoNode { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{MemoryEnsemble, MemorySession, SessionOptions};
    use std::time::Duration;

    async fn session(ensemble: &MemoryEnsemble) -> MemorySession {
        ensemble
            .connect(&SessionOptions {
                servers: "memory:tree-ops".to_string(),
                session_timeout: Duration::from_secs(60),
                connection_timeout: Duration::from_secs(15),
                credentials: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_with_parents_builds_missing_ancestors() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        let created = create_with_parents(&s, "/a/b/c", b"leaf", CreateMode::Persistent)
            .await
            .unwrap();
        assert_eq!(created, "/a/b/c");
        assert_eq!(ensemble.peek("/a").unwrap().0, b"");
        assert_eq!(ensemble.peek("/a/b/c").unwrap().0, b"leaf");
    }

    #[tokio::test]
    async fn test_create_with_parents_reports_existing_leaf() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        create_with_parents(&s, "/x/y", b"1", CreateMode::Persistent)
            .await
            .unwrap();
        let err = create_with_parents(&s, "/x/y", b"2", CreateMode::Persistent)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinationError::node_exists("/x/y"));
    }

    #[tokio::test]
    async fn test_delete_recursive_removes_subtree() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        for path in ["/r/a/1", "/r/a/2", "/r/b"] {
            create_with_parents(&s, path, b"", CreateMode::Persistent)
                .await
                .unwrap();
        }
        create_with_parents(&s, "/keep", b"", CreateMode::Persistent)
            .await
            .unwrap();

        delete_recursive(&s, "/r").await.unwrap();
        assert!(ensemble.peek("/r").is_none());
        assert!(ensemble.peek("/r/a/1").is_none());
        assert!(ensemble.peek("/keep").is_some());
    }

    #[tokio::test]
    async fn test_delete_recursive_on_absent_root_is_noop() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        delete_recursive(&s, "/never").await.unwrap();
    }

    #[tokio::test]
    async fn test_collect_subtree_orders_parents_first() {
        let ensemble = MemoryEnsemble::new();
        let s = session(&ensemble).await;
        create_with_parents(&s, "/t/c/d", b"", CreateMode::Persistent)
            .await
            .unwrap();
        let subtree = collect_subtree(&s, "/t").await.unwrap();
        assert_eq!(subtree, vec!["/t", "/t/c", "/t/c/d"]);
    }
}
