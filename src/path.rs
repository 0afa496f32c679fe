//! # Tree Paths
//!
//! Validation and manipulation of `/`-delimited node paths, plus the
//! namespace mapping between consumer keys (`/db.url`) and full tree paths
//! (`/my-namespace/db.url`).

use crate::constants::{PATH_SEPARATOR, ROOT_PATH};
use crate::error::{RegistryError, RegistryResult};

/// Validate an absolute node path
pub fn validate(path: &str) -> RegistryResult<()> {
    if path.is_empty() {
        return Err(RegistryError::invalid_path(path, "path must not be empty"));
    }
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(RegistryError::invalid_path(path, "path must start with '/'"));
    }
    if path == ROOT_PATH {
        return Ok(());
    }
    if path.ends_with(PATH_SEPARATOR) {
        return Err(RegistryError::invalid_path(path, "path must not end with '/'"));
    }
    for segment in path[1..].split(PATH_SEPARATOR) {
        match segment {
            "" => return Err(RegistryError::invalid_path(path, "empty path segment")),
            "." | ".." => {
                return Err(RegistryError::invalid_path(path, "relative path segment"))
            }
            s if s.chars().any(char::is_control) => {
                return Err(RegistryError::invalid_path(path, "control character in path"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Join a child name onto a parent path
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Parent of a path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a path
pub fn node_name(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Proper ancestors of a path from the top down, excluding the root
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result: Vec<&str> = path
        .char_indices()
        .filter(|&(idx, c)| c == PATH_SEPARATOR && idx > 0)
        .map(|(idx, _)| &path[..idx])
        .collect();
    result.dedup();
    result
}

/// Whether `path` equals `root` or lies beneath it
pub fn is_within(root: &str, path: &str) -> bool {
    if root == ROOT_PATH {
        return path.starts_with(PATH_SEPARATOR);
    }
    path == root
        || (path.starts_with(root) && path[root.len()..].starts_with(PATH_SEPARATOR))
}

/// Maps consumer keys into a namespace subtree and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: String,
}

impl Namespace {
    /// Create a namespace; an empty name maps keys onto the tree root
    pub fn new(name: &str) -> RegistryResult<Self> {
        let trimmed = name.trim_matches(PATH_SEPARATOR);
        if trimmed.is_empty() {
            return Ok(Self {
                root: ROOT_PATH.to_string(),
            });
        }
        let root = format!("/{trimmed}");
        validate(&root)?;
        Ok(Self { root })
    }

    /// Full path of the namespace node
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Validate a consumer key and resolve it to a full tree path
    pub fn resolve(&self, key: &str) -> RegistryResult<String> {
        validate(key)?;
        if self.root == ROOT_PATH {
            return Ok(key.to_string());
        }
        if key == ROOT_PATH {
            return Ok(self.root.clone());
        }
        Ok(format!("{}{}", self.root, key))
    }

    /// Strip the namespace prefix from a full tree path
    pub fn relativize<'a>(&self, full: &'a str) -> Option<&'a str> {
        if self.root == ROOT_PATH {
            return Some(full);
        }
        if full == self.root {
            return Some(ROOT_PATH);
        }
        full.strip_prefix(self.root.as_str())
            .filter(|rest| rest.starts_with(PATH_SEPARATOR))
    }
}
