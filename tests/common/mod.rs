#![allow(dead_code)] // Each test binary uses a different subset of helpers

pub mod strategies;

use std::io::Write;
use std::time::Duration;
use tasker_registry::{
    Connector, LegacyRegistryCenter, MemoryEnsemble, RegistryCenter, RegistryConfig,
};
use tempfile::NamedTempFile;

/// Generate a unique namespace for test isolation
pub fn unique_namespace(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Builder for registry centers sharing one in-memory ensemble
pub struct RegistryFixture {
    ensemble: MemoryEnsemble,
    config: RegistryConfig,
}

impl RegistryFixture {
    pub fn new(namespace: &str) -> Self {
        Self {
            ensemble: MemoryEnsemble::new(),
            config: RegistryConfig::in_memory(namespace).with_retry(1, 3, 5),
        }
    }

    pub fn on_ensemble(ensemble: &MemoryEnsemble, namespace: &str) -> Self {
        Self {
            ensemble: ensemble.clone(),
            config: RegistryConfig::in_memory(namespace).with_retry(1, 3, 5),
        }
    }

    pub fn with_digest(mut self, digest: &str) -> Self {
        self.config = self.config.with_digest(digest);
        self
    }

    pub fn with_seed(mut self, seed: &NamedTempFile, overwrite: bool) -> Self {
        self.config = self.config.with_local_properties(seed.path(), overwrite);
        self
    }

    pub fn with_retry(mut self, base_ms: u64, max_retries: u32, max_ms: u64) -> Self {
        self.config = self.config.with_retry(base_ms, max_retries, max_ms);
        self
    }

    pub fn with_cache_shutdown_timeout(mut self, millis: u64) -> Self {
        self.config = self.config.with_cache_shutdown_timeout(millis);
        self
    }

    pub fn ensemble(&self) -> &MemoryEnsemble {
        &self.ensemble
    }

    pub fn center(&self) -> RegistryCenter {
        RegistryCenter::with_connector(
            self.config.clone(),
            Connector::memory(self.ensemble.clone()),
        )
    }

    pub fn legacy(&self) -> LegacyRegistryCenter {
        LegacyRegistryCenter::with_connector(
            self.config.clone(),
            Connector::memory(self.ensemble.clone()),
        )
    }

    /// Started registry center whose cache has finished populating
    pub async fn started(&self) -> RegistryCenter {
        let center = self.center();
        center.init().await.expect("registry center should start");
        let cache = center.cache_handle().expect("cache handle after init");
        assert!(
            cache.wait_initialized(Duration::from_secs(2)).await,
            "cache should initialize"
        );
        center
    }
}

/// Write a properties seed file
pub fn seed_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp seed file");
    file.write_all(contents.as_bytes()).expect("write seed file");
    file
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
