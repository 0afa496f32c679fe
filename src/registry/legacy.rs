//! # Sentinel-Valued Registry Surface
//!
//! Drop-in surface for callers that expect registry operations to never
//! fail: reads return `None`, `false` or empty collections and writes return
//! nothing. Every swallowed failure passes through the shared
//! [`ErrorPolicy`], so interruptions stay observable and other failures are
//! counted and logged.
//!
//! Only local configuration mistakes escape, and only from `init`.
//!
//! ```rust
//! use tasker_registry::{CoordinatorRegistryCenter, LegacyRegistryCenter, RegistryConfig};
//!
//! # tokio_test::block_on(async {
//! let center = LegacyRegistryCenter::new(RegistryConfig::in_memory("docs"));
//! center.init().await.unwrap();
//!
//! center.persist("/instances/a", "up").await;
//! assert_eq!(center.get_directly("/instances/a").await.as_deref(), Some("up"));
//! assert_eq!(center.get_directly("/instances/missing").await, None);
//!
//! center.close().await;
//! # });
//! ```

use crate::config::RegistryConfig;
use crate::coordinator::Connector;
use crate::error::RegistryResult;
use crate::error_policy::ErrorPolicy;
use crate::registry::center::RegistryCenter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Registry center contract with sentinel results
#[async_trait]
pub trait CoordinatorRegistryCenter: Send + Sync {
    /// Start the registry center; only configuration errors are returned
    async fn init(&self) -> RegistryResult<()>;

    async fn close(&self);

    async fn get(&self, key: &str) -> Option<String>;

    async fn get_directly(&self, key: &str) -> Option<String>;

    async fn get_children_keys(&self, key: &str) -> Vec<String>;

    async fn get_num_children(&self, key: &str) -> usize;

    async fn is_existed(&self, key: &str) -> bool;

    async fn persist(&self, key: &str, value: &str);

    async fn update(&self, key: &str, value: &str);

    async fn persist_ephemeral(&self, key: &str, value: &str);

    async fn persist_ephemeral_sequential(&self, key: &str);

    async fn remove(&self, key: &str);

    async fn get_registry_center_time(&self, key: &str) -> Option<DateTime<Utc>>;
}

/// [`RegistryCenter`] behind the sentinel-valued contract
#[derive(Debug)]
pub struct LegacyRegistryCenter {
    center: RegistryCenter,
    policy: ErrorPolicy,
}

impl LegacyRegistryCenter {
    pub fn new(config: RegistryConfig) -> Self {
        Self::from_center(RegistryCenter::new(config))
    }

    pub fn with_connector(config: RegistryConfig, connector: Connector) -> Self {
        Self::from_center(RegistryCenter::with_connector(config, connector))
    }

    pub fn from_center(center: RegistryCenter) -> Self {
        Self {
            center,
            policy: ErrorPolicy::new(),
        }
    }

    /// Policy shared by every operation on this instance
    pub fn policy(&self) -> &ErrorPolicy {
        &self.policy
    }

    /// The strict registry center underneath
    pub fn inner(&self) -> &RegistryCenter {
        &self.center
    }

    fn absorb<T>(&self, operation: &str, key: &str, result: RegistryResult<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                self.policy.handle(operation, key, &e);
                fallback
            }
        }
    }
}

#[async_trait]
impl CoordinatorRegistryCenter for LegacyRegistryCenter {
    async fn init(&self) -> RegistryResult<()> {
        match self.center.init().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_configuration_error() => Err(e),
            Err(e) => {
                self.policy
                    .handle("init", &self.center.config().server_lists, &e);
                Ok(())
            }
        }
    }

    async fn close(&self) {
        let result = self.center.close().await.map(|_| ());
        self.absorb("close", "", result, ());
    }

    async fn get(&self, key: &str) -> Option<String> {
        let result = self.center.get(key).await;
        self.absorb("get", key, result, None)
    }

    async fn get_directly(&self, key: &str) -> Option<String> {
        let result = self.center.get_directly(key).await;
        self.absorb("get_directly", key, result, None)
    }

    async fn get_children_keys(&self, key: &str) -> Vec<String> {
        let result = self.center.get_children_keys(key).await;
        self.absorb("get_children_keys", key, result, Vec::new())
    }

    async fn get_num_children(&self, key: &str) -> usize {
        let result = self.center.get_num_children(key).await;
        self.absorb("get_num_children", key, result, 0)
    }

    async fn is_existed(&self, key: &str) -> bool {
        let result = self.center.is_existed(key).await;
        self.absorb("is_existed", key, result, false)
    }

    async fn persist(&self, key: &str, value: &str) {
        let result = self.center.persist(key, value).await;
        self.absorb("persist", key, result, ());
    }

    async fn update(&self, key: &str, value: &str) {
        let result = self.center.update(key, value).await;
        self.absorb("update", key, result, ());
    }

    async fn persist_ephemeral(&self, key: &str, value: &str) {
        let result = self.center.persist_ephemeral(key, value).await;
        self.absorb("persist_ephemeral", key, result, ());
    }

    async fn persist_ephemeral_sequential(&self, key: &str) {
        let result = self.center.persist_ephemeral_sequential(key).await.map(|_| ());
        self.absorb("persist_ephemeral_sequential", key, result, ());
    }

    async fn remove(&self, key: &str) {
        let result = self.center.remove(key).await;
        self.absorb("remove", key, result, ());
    }

    async fn get_registry_center_time(&self, key: &str) -> Option<DateTime<Utc>> {
        let result = self.center.get_registry_center_time(key).await.map(Some);
        self.absorb("get_registry_center_time", key, result, None)
    }
}

impl From<RegistryCenter> for LegacyRegistryCenter {
    fn from(center: RegistryCenter) -> Self {
        Self::from_center(center)
    }
}
