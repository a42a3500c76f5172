use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Defines the contract for one independent lock store instance.
///
/// Every operation must be atomic on the instance for the whole resource
/// set, and must fail fast rather than block: the coordinator also wraps
/// each call in a timeout, but a backend that hangs holds a task hostage
/// until then. `Ok(false)` means "definitely not applied"; `Err` means
/// "unknown".
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set every key in `resources` to `token` with expiry `ttl`, only if
    /// none of them exists. Returns `true` iff this call created them.
    async fn try_acquire(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Delete each key in `resources` whose value equals `token`.
    /// Returns `true` iff at least one key was deleted. An absent key or a
    /// foreign token is `Ok(false)`, never an error.
    async fn try_release(&self, resources: &[String], token: &str) -> Result<bool, StoreError>;

    /// Reset the expiry of every key to `ttl`, only if all of them
    /// currently hold `token`.
    async fn try_extend(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Short human-readable label for logs ("redis://10.0.0.1:6379/0").
    fn describe(&self) -> String;
}
