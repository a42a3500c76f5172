//! High-level lock manager: the public entry point wrapping the quorum
//! coordinator with token generation, retries and jittered backoff.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{validate_options, ManagerOptions, RetryPolicy, MAX_TTL};
use crate::error::{RedlockError, Result};
use crate::infrastructure::LockStore;
use crate::quorum::QuorumCoordinator;
use crate::types::{normalize_resources, Lock, OwnerToken};

/// Distributed lock manager over a fixed set of independent stores.
///
/// The manager keeps no record of the locks it hands out: exclusion is
/// enforced entirely by the stores' conditional writes, so any number of
/// tasks (or processes, or hosts) may call it concurrently. Share one
/// instance behind an `Arc` or clone it; clones share the store handles.
#[derive(Clone)]
pub struct LockManager {
    coordinator: QuorumCoordinator,
    options: ManagerOptions,
}

impl LockManager {
    /// Create a manager over `stores`.
    ///
    /// Fails with [`RedlockError::Configuration`] for fewer than three
    /// stores, a quorum override that is not a usable majority, or invalid
    /// retry/drift settings.
    pub fn new(stores: Vec<Arc<dyn LockStore>>, options: ManagerOptions) -> Result<Self> {
        validate_options(&options)?;
        let coordinator = QuorumCoordinator::new(
            stores,
            options.quorum,
            options.clock,
            options.per_handle_timeout,
        )?;
        Ok(Self {
            coordinator,
            options,
        })
    }

    /// Create a manager with one Redis store per configured endpoint.
    #[cfg(feature = "redis")]
    pub fn from_config(config: &crate::config::RedlockConfig) -> Result<Self> {
        use crate::infrastructure_redis::RedisLockStore;

        config.validate()?;
        let stores = config
            .store_endpoints
            .iter()
            .map(|endpoint| {
                RedisLockStore::from_endpoint(endpoint)
                    .map(|store| Arc::new(store) as Arc<dyn LockStore>)
                    .map_err(|e| {
                        RedlockError::Configuration(format!("store {}: {}", endpoint, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(stores, config.options())
    }

    pub fn quorum(&self) -> usize {
        self.coordinator.quorum()
    }

    pub fn store_count(&self) -> usize {
        self.coordinator.store_count()
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Lock a single resource for `ttl` with the manager's retry policy.
    pub async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Lock> {
        self.acquire_with(&[resource.to_string()], ttl, &self.options.retry)
            .await
    }

    /// Lock a single resource for the configured default TTL.
    pub async fn acquire_default(&self, resource: &str) -> Result<Lock> {
        self.acquire(resource, self.options.default_ttl).await
    }

    /// Lock several resources as one unit: on every store either all keys
    /// are written or none is.
    pub async fn acquire_many<I, S>(&self, resources: I, ttl: Duration) -> Result<Lock>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let resources = normalize_resources(resources);
        self.acquire_with(&resources, ttl, &self.options.retry)
            .await
    }

    /// Full form of `acquire` with a per-call retry policy.
    ///
    /// Draws one fresh owner token, then runs up to `retry.retry_count`
    /// rounds, sleeping a uniformly random delay from the policy's range
    /// between failed rounds. Every failed round releases whatever it
    /// managed to write before the next one starts.
    pub async fn acquire_with(
        &self,
        resources: &[String],
        ttl: Duration,
        retry: &RetryPolicy,
    ) -> Result<Lock> {
        let resources = normalize_resources(resources.iter().cloned());
        check_request(&resources, ttl)?;
        retry
            .validate()
            .map_err(|e| RedlockError::InvalidRequest(e.to_string()))?;

        let token = OwnerToken::generate();

        for attempt in 1..=retry.retry_count {
            match self.coordinator.acquire(&resources, &token, ttl).await {
                Ok(lock) => {
                    tracing::debug!(
                        resources = ?lock.resources(),
                        attempt,
                        validity_ms = lock.validity().as_millis() as u64,
                        "Lock acquired"
                    );
                    return Ok(lock);
                }
                Err(failure) => {
                    tracing::debug!(resources = ?resources, attempt, reason = %failure, "Lock round failed");
                    if attempt < retry.retry_count {
                        tokio::time::sleep(retry.next_delay()).await;
                    }
                }
            }
        }

        Err(RedlockError::ResourceBusy {
            resources,
            attempts: retry.retry_count,
        })
    }

    /// Release a lock on every store. Never fails: keys that already
    /// expired or were never written are skipped, and unreachable stores
    /// let the key expire on its own. Safe to call more than once.
    pub async fn release(&self, lock: &Lock) {
        let released = self
            .coordinator
            .release(lock.resources(), lock.token())
            .await;
        tracing::debug!(resources = ?lock.resources(), released, "Lock released");
    }

    /// Push the expiry of a held lock to `ttl` from now, keeping its token.
    ///
    /// Subject to the same quorum and drift rules as acquisition, and to
    /// the manager's retry policy. The returned lock replaces `lock`.
    pub async fn extend(&self, lock: &Lock, ttl: Duration) -> Result<Lock> {
        check_request(lock.resources(), ttl)?;
        if lock.is_expired() {
            return Err(RedlockError::LockExpired {
                resources: lock.resources().to_vec(),
            });
        }

        let retry = &self.options.retry;
        for attempt in 1..=retry.retry_count {
            match self
                .coordinator
                .extend(lock.resources(), lock.token(), ttl)
                .await
            {
                Ok(extended) => return Ok(extended),
                Err(failure) => {
                    tracing::debug!(resources = ?lock.resources(), attempt, reason = %failure, "Extend round failed");
                    if attempt < retry.retry_count {
                        tokio::time::sleep(retry.next_delay()).await;
                    }
                }
            }
        }

        Err(RedlockError::ResourceBusy {
            resources: lock.resources().to_vec(),
            attempts: retry.retry_count,
        })
    }
}

fn check_request(resources: &[String], ttl: Duration) -> Result<()> {
    if resources.is_empty() {
        return Err(RedlockError::InvalidRequest(
            "at least one resource is required".to_string(),
        ));
    }
    if resources.iter().any(|r| r.is_empty()) {
        return Err(RedlockError::InvalidRequest(
            "resource names must not be empty".to_string(),
        ));
    }
    if ttl.is_zero() {
        return Err(RedlockError::InvalidRequest(
            "ttl must be greater than 0".to_string(),
        ));
    }
    if ttl > MAX_TTL {
        return Err(RedlockError::InvalidRequest(format!(
            "ttl must not exceed {:?}",
            MAX_TTL
        )));
    }
    Ok(())
}
