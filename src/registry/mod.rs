//! # Registry Center
//!
//! Namespaced registry operations over a coordination session.
//!
//! ## Components
//!
//! ```text
//! RegistryCenter            <- strict API, explicit RegistryResult
//!   ├── SessionConnector    <- connect with exponential-backoff retry
//!   ├── LocalSeed           <- properties file imported at init
//!   └── TreeCache           <- watch-fed mirror serving reads
//!
//! LegacyRegistryCenter      <- sentinel results through ErrorPolicy
//! SessionHandle/CacheHandle <- narrow capabilities for recipes
//! ```

pub mod cache;
pub mod capability;
pub mod center;
pub mod connector;
pub mod legacy;
pub mod seed;
pub mod tree_ops;

pub use cache::{CacheEntry, CacheShutdown, CacheState, TreeCache};
pub use capability::{CacheHandle, SessionHandle};
pub use center::RegistryCenter;
pub use connector::SessionConnector;
pub use legacy::{CoordinatorRegistryCenter, LegacyRegistryCenter};
pub use seed::{LocalSeed, SeedReport};
