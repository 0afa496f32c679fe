#![allow(clippy::doc_markdown)] // Allow technical terms like ZooKeeper in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Registry
//!
//! Registry-center client for a hierarchical coordination service such as
//! ZooKeeper.
//!
//! ## Overview
//!
//! Distributed job processes share configuration, membership and election
//! state through a tree of small nodes. This crate gives them a namespaced
//! key/value view of that tree: a session established with bounded
//! exponential-backoff retry, an optional seed imported from a local
//! properties file, and a watch-fed local mirror that serves reads.
//!
//! ## Module Organization
//!
//! - [`registry`] - Registry center, tree cache, seed loader, capabilities
//! - [`coordinator`] - Coordination backends (in-memory, ZooKeeper)
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Structured error handling
//! - [`error_policy`] - Classification of swallowed failures
//! - [`retry`] - Exponential backoff policy
//! - [`path`] - Path validation and namespacing
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tasker_registry::{RegistryCenter, RegistryConfig};
//!
//! # async fn example() -> Result<(), tasker_registry::RegistryError> {
//! let center = RegistryCenter::new(RegistryConfig::new("zk1:2181,zk2:2181", "scheduler"));
//! center.init().await?;
//!
//! center.persist("/config/sharding", "3").await?;
//! let sharding = center.get("/config/sharding").await?;
//! assert_eq!(sharding.as_deref(), Some("3"));
//!
//! center.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! Server lists starting with `memory:` use an in-process ensemble, which is
//! what the test suite runs against. Real ensembles require the `zookeeper`
//! feature.
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod error_policy;
pub mod logging;
pub mod path;
pub mod properties;
pub mod registry;
pub mod retry;

pub use config::RegistryConfig;
pub use coordinator::{
    CoordinationError, CoordinationResult, CoordinationService, Connector, Coordinator,
    CreateMode, MemoryEnsemble, NodeStat,
};
pub use error::{RegistryError, RegistryResult};
pub use error_policy::{ErrorDisposition, ErrorPolicy, ErrorPolicyStats};
pub use logging::init_structured_logging;
pub use path::Namespace;
pub use registry::{
    CacheEntry, CacheHandle, CacheShutdown, CoordinatorRegistryCenter, LegacyRegistryCenter,
    RegistryCenter, SessionHandle,
};
pub use retry::ExponentialBackoffRetry;
