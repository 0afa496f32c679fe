//! Local seed loading
//!
//! A properties file shipped with a deployment is imported into the
//! namespace when a session is first established. Existing values are kept
//! unless they are empty or `overwrite` is set.

use crate::constants::PATH_SEPARATOR;
use crate::coordinator::{CoordinationError, CoordinationService, CreateMode};
use crate::error::{RegistryError, RegistryResult};
use crate::path::{self, Namespace};
use crate::properties;
use crate::registry::tree_ops;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome counts of one seed import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SeedReport {
    pub created: usize,
    pub overwritten: usize,
    pub kept: usize,
}

/// Parsed seed resource
#[derive(Debug, Clone)]
pub struct LocalSeed {
    source: PathBuf,
    entries: Vec<(String, String)>,
}

impl LocalSeed {
    /// Read and parse the seed file
    ///
    /// Keys without a leading `/` are treated as rooted at the namespace.
    pub fn load(file: &Path) -> RegistryResult<Self> {
        let shown = file.display().to_string();
        let text = std::fs::read_to_string(file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RegistryError::LocalPropertiesNotFound {
                path: shown.clone(),
            },
            _ => RegistryError::LocalPropertiesUnreadable {
                path: shown.clone(),
                reason: e.to_string(),
            },
        })?;
        let parsed =
            properties::parse(&text).map_err(|e| RegistryError::LocalPropertiesUnreadable {
                path: shown.clone(),
                reason: e.to_string(),
            })?;

        let mut entries = Vec::with_capacity(parsed.len());
        for (key, value) in parsed {
            let key = if key.starts_with(PATH_SEPARATOR) {
                key
            } else {
                format!("{PATH_SEPARATOR}{key}")
            };
            path::validate(&key)?;
            entries.push((key, value));
        }
        debug!(path = %shown, entries = entries.len(), "Loaded local seed");
        Ok(Self {
            source: file.to_path_buf(),
            entries,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Namespace-relative keys and values in file order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Import every entry beneath `namespace`
    pub async fn apply<C: CoordinationService>(
        &self,
        coordinator: &C,
        namespace: &Namespace,
        overwrite: bool,
    ) -> RegistryResult<SeedReport> {
        let mut report = SeedReport::default();
        for (key, value) in &self.entries {
            let full = namespace.resolve(key)?;
            match coordinator.exists(&full).await? {
                None => {
                    match tree_ops::create_with_parents(
                        coordinator,
                        &full,
                        value.as_bytes(),
                        CreateMode::Persistent,
                    )
                    .await
                    {
                        Ok(_) => report.created += 1,
                        // Another client seeded it first; treat it as existing
                        Err(CoordinationError::NodeExists { .. }) => report.kept += 1,
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(stat) if overwrite || stat.data_length == 0 => {
                    coordinator
                        .set_data(&full, value.as_bytes(), None)
                        .await?;
                    report.overwritten += 1;
                }
                Some(_) => report.kept += 1,
            }
        }
        info!(
            source = %self.source.display(),
            namespace = namespace.root(),
            created = report.created,
            overwritten = report.overwritten,
            kept = report.kept,
            "🌱 Local seed applied"
        );
        Ok(report)
    }
}
