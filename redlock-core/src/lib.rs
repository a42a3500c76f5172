//! # redlock-core
//!
//! Client-side Redlock: mutually exclusive, time-bounded locks held on a
//! majority of independent key-value store instances that never talk to
//! each other. Provides the quorum round, clock-drift compensation,
//! jittered retries and best-effort release.
//!
//! The lock is only as safe as its operating assumptions: bounded clock
//! drift between the caller and the stores, and no process pause between
//! acquiring a lock and using the resource that outlasts the drift margin.
//! It is not a consensus protocol.

pub mod clock;
pub mod config;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "redis")]
#[path = "infrastructure_redis.rs"]
pub mod infrastructure_redis;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod manager;
pub mod quorum;
pub mod types;

pub use config::{ManagerOptions, RedlockConfig, RetryPolicy, StoreEndpoint};
pub use error::{RedlockError, StoreError};
pub use infrastructure::LockStore;
pub use manager::LockManager;
pub use types::{Lock, OwnerToken};

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod quorum_test;
