//! # Registry Constants
//!
//! Operational boundaries shared by the connector, the tree cache and the
//! path operations.

use std::time::Duration;

/// Path separator and root of every coordination tree
pub const PATH_SEPARATOR: char = '/';
pub const ROOT_PATH: &str = "/";

/// Authentication scheme used when a digest secret is configured
pub const DIGEST_SCHEME: &str = "digest";

/// Width of the numeric suffix appended to sequential nodes
pub const SEQUENCE_SUFFIX_WIDTH: usize = 10;

/// Session and connection timeouts applied when configured as zero
pub mod timeouts {
    use super::Duration;

    pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(60_000);
    pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(15_000);

    /// Upper bound on the tree cache drain during `close`
    pub const DEFAULT_CACHE_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);
}

/// Exponential backoff defaults and hard limits
pub mod retry {
    pub const DEFAULT_BASE_SLEEP_MS: u64 = 1000;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_MAX_SLEEP_MS: u64 = 3000;

    /// Beyond this the shift in the backoff computation overflows a u32
    pub const MAX_RETRIES_LIMIT: u32 = 29;
}

/// Environment variable names consulted by configuration and logging
pub mod env {
    pub const CONFIG_PREFIX: &str = "TASKER_REGISTRY";
    pub const ENVIRONMENT: &str = "TASKER_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "TASKER_LOG_FORMAT";
}

/// Server list prefix selecting a private in-process ensemble
pub const MEMORY_SERVER_PREFIX: &str = "memory:";
