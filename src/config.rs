//! # Registry Configuration
//!
//! Connection, retry, authentication and seeding settings for a registry
//! center. Supports config files, environment variables and builder-style
//! overrides.
//!
//! ## Usage
//!
//! ```rust
//! use tasker_registry::config::RegistryConfig;
//!
//! let config = RegistryConfig::new("zk1:2181,zk2:2181", "scheduler")
//!     .with_retry(500, 5, 5000)
//!     .with_digest("scheduler:secret");
//! assert_eq!(config.max_retries, 5);
//! assert!(config.validate().is_ok());
//! ```

use crate::constants::{env, retry, timeouts, MEMORY_SERVER_PREFIX};
use crate::coordinator::{Credentials, SessionOptions};
use crate::error::{RegistryError, RegistryResult};
use crate::path::Namespace;
use crate::retry::ExponentialBackoffRetry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Registry center configuration
///
/// Immutable once handed to a registry center. Zero timeouts mean "use the
/// backend default".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Comma separated ensemble addresses (`host:port,host:port`)
    pub server_lists: String,
    /// Root prefix applied to every key
    pub namespace: String,
    pub base_sleep_time_milliseconds: u64,
    pub max_retries: u32,
    pub max_sleep_time_milliseconds: u64,
    pub session_timeout_milliseconds: u64,
    pub connection_timeout_milliseconds: u64,
    /// `user:password` secret; enables creator-only ACLs
    pub digest: Option<String>,
    /// Properties file imported into the tree on first connect
    pub local_properties_path: Option<PathBuf>,
    /// Whether seeded values replace existing non-empty values
    pub overwrite: bool,
    /// Upper bound on waiting for the tree cache to drain during close
    pub cache_shutdown_timeout_milliseconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            server_lists: "localhost:2181".to_string(),
            namespace: "tasker".to_string(),
            base_sleep_time_milliseconds: retry::DEFAULT_BASE_SLEEP_MS,
            max_retries: retry::DEFAULT_MAX_RETRIES,
            max_sleep_time_milliseconds: retry::DEFAULT_MAX_SLEEP_MS,
            session_timeout_milliseconds: 0,
            connection_timeout_milliseconds: 0,
            digest: None,
            local_properties_path: None,
            overwrite: false,
            cache_shutdown_timeout_milliseconds: timeouts::DEFAULT_CACHE_SHUTDOWN_TIMEOUT
                .as_millis() as u64,
        }
    }
}

impl RegistryConfig {
    pub fn new(server_lists: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            server_lists: server_lists.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Configuration for a private in-process ensemble
    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self::new(format!("{MEMORY_SERVER_PREFIX}local"), namespace)
    }

    pub fn with_retry(mut self, base_sleep_ms: u64, max_retries: u32, max_sleep_ms: u64) -> Self {
        self.base_sleep_time_milliseconds = base_sleep_ms;
        self.max_retries = max_retries;
        self.max_sleep_time_milliseconds = max_sleep_ms;
        self
    }

    pub fn with_timeouts(mut self, session_ms: u64, connection_ms: u64) -> Self {
        self.session_timeout_milliseconds = session_ms;
        self.connection_timeout_milliseconds = connection_ms;
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_local_properties(mut self, path: impl Into<PathBuf>, overwrite: bool) -> Self {
        self.local_properties_path = Some(path.into());
        self.overwrite = overwrite;
        self
    }

    pub fn with_cache_shutdown_timeout(mut self, millis: u64) -> Self {
        self.cache_shutdown_timeout_milliseconds = millis;
        self
    }

    /// Load configuration from environment variables and an optional file
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables (`TASKER_REGISTRY_SERVER_LISTS`, ...)
    /// 2. Config file (`./config/registry.{toml,yaml,json}` or `./registry.*`)
    /// 3. Default values
    pub fn load() -> RegistryResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/registry").required(false))
            .add_source(config::File::with_name("registry").required(false));
        builder = builder.add_source(
            config::Environment::with_prefix(env::CONFIG_PREFIX).try_parsing(true),
        );
        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        debug!(config = %loaded.sanitized(), "Loaded registry configuration");
        Ok(loaded)
    }

    /// Load configuration from a specific file; the format follows the extension
    pub fn load_from_file(path: &Path) -> RegistryResult<Self> {
        if !path.is_file() {
            return Err(RegistryError::config_error(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings no session could be established with
    pub fn validate(&self) -> RegistryResult<()> {
        if self.server_lists.trim().is_empty() {
            return Err(RegistryError::config_error("server_lists must not be empty"));
        }
        Namespace::new(&self.namespace)?;
        if self.max_sleep_time_milliseconds < self.base_sleep_time_milliseconds {
            return Err(RegistryError::config_error(format!(
                "max_sleep_time_milliseconds ({}) is below base_sleep_time_milliseconds ({})",
                self.max_sleep_time_milliseconds, self.base_sleep_time_milliseconds
            )));
        }
        if let Some(digest) = &self.digest {
            if !digest.is_empty() && !digest.contains(':') {
                return Err(RegistryError::config_error(
                    "digest must have the form user:password",
                ));
            }
        }
        Ok(())
    }

    pub fn namespace(&self) -> RegistryResult<Namespace> {
        Namespace::new(&self.namespace)
    }

    pub fn retry_policy(&self) -> ExponentialBackoffRetry {
        ExponentialBackoffRetry::new(
            Duration::from_millis(self.base_sleep_time_milliseconds),
            self.max_retries,
            Duration::from_millis(self.max_sleep_time_milliseconds),
        )
    }

    pub fn session_timeout(&self) -> Duration {
        match self.session_timeout_milliseconds {
            0 => timeouts::DEFAULT_SESSION_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        match self.connection_timeout_milliseconds {
            0 => timeouts::DEFAULT_CONNECTION_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn cache_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_shutdown_timeout_milliseconds)
    }

    /// Credentials to authenticate with; an empty digest means none
    pub fn credentials(&self) -> Option<Credentials> {
        self.digest
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(Credentials::digest)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            servers: self.server_lists.clone(),
            session_timeout: self.session_timeout(),
            connection_timeout: self.connection_timeout(),
            credentials: self.credentials(),
        }
    }

    /// JSON view safe for logs, with the digest masked
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(digest) = value.get_mut("digest") {
            if !digest.is_null() {
                *digest = serde_json::Value::String("***REDACTED***".to_string());
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.server_lists, "localhost:2181");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.session_timeout(), timeouts::DEFAULT_SESSION_TIMEOUT);
        assert_eq!(config.connection_timeout(), timeouts::DEFAULT_CONNECTION_TIMEOUT);
        assert_eq!(config.cache_shutdown_timeout(), Duration::from_millis(500));
        assert!(config.credentials().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(RegistryConfig::new("", "ns").validate().is_err());
        assert!(RegistryConfig::new("zk:2181", "a//b").validate().is_err());
        assert!(RegistryConfig::new("zk:2181", "ns")
            .with_retry(1000, 3, 10)
            .validate()
            .is_err());
        assert!(RegistryConfig::new("zk:2181", "ns")
            .with_digest("no-separator")
            .validate()
            .is_err());
    }

    #[test]
    fn test_sanitized_masks_digest() {
        let config = RegistryConfig::new("zk:2181", "ns").with_digest("user:secret");
        let sanitized = config.sanitized();
        assert_eq!(sanitized["digest"], "***REDACTED***");
        assert!(!sanitized.to_string().contains("secret"));
        assert_eq!(sanitized["server_lists"], "zk:2181");
    }

    #[test]
    fn test_empty_digest_means_no_credentials() {
        let config = RegistryConfig::new("zk:2181", "ns").with_digest("");
        assert!(config.credentials().is_none());
        assert!(config.session_options().credentials.is_none());
    }

    #[test]
    fn test_load_from_toml_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.toml");
        std::fs::write(
            &path,
            r#"
server_lists = "zk1:2181,zk2:2181"
namespace = "jobs"
max_retries = 7
digest = "jobs:pw"
"#,
        )
        .unwrap();

        let config = RegistryConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server_lists, "zk1:2181,zk2:2181");
        assert_eq!(config.namespace, "jobs");
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.base_sleep_time_milliseconds, retry::DEFAULT_BASE_SLEEP_MS);
        assert_eq!(config.credentials().unwrap().identity(), "digest:jobs");
    }

    #[test]
    fn test_load_from_missing_file_is_configuration_error() {
        let err = RegistryConfig::load_from_file(Path::new("/nonexistent/registry.toml"))
            .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
