use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;

use crate::clock::ClockModel;
use crate::error::{RedlockError, Result, StoreError};
use crate::infrastructure::LockStore;
use crate::types::{Lock, OwnerToken};

/// Fewest independent stores a manager accepts.
pub const MIN_STORES: usize = 3;

/// Lower bound on the derived per-handle timeout.
pub const MIN_HANDLE_TIMEOUT: Duration = Duration::from_millis(5);

/// Per-handle bound on release calls, which carry no TTL to derive one from.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolves the quorum for `stores` handles: the majority `floor(N/2) + 1`,
/// or an override that is still a strict majority and below `N`.
pub fn resolve_quorum(stores: usize, requested: Option<usize>) -> Result<usize> {
    if stores < MIN_STORES {
        return Err(RedlockError::Configuration(format!(
            "at least {} stores are required, got {}",
            MIN_STORES, stores
        )));
    }

    let majority = stores / 2 + 1;
    match requested {
        None => Ok(majority),
        Some(q) if q < majority => Err(RedlockError::Configuration(format!(
            "quorum {} is not a majority of {} stores",
            q, stores
        ))),
        Some(q) if q >= stores => Err(RedlockError::Configuration(format!(
            "quorum {} is unsatisfiable with {} stores once any store is down",
            q, stores
        ))),
        Some(q) => Ok(q),
    }
}

/// What one handle answered during a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The operation was applied
    Granted,
    /// The store answered and refused (key held by someone else)
    Rejected,
    /// No definitive answer; the write may or may not have landed
    Failed(StoreError),
}

#[derive(Debug, Clone)]
pub struct HandleAttempt {
    pub index: usize,
    pub outcome: HandleOutcome,
    pub latency: Duration,
}

/// Transient record of one round, discarded once the round is judged.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub started_at: Instant,
    pub elapsed: Duration,
    pub attempts: Vec<HandleAttempt>,
}

impl AttemptRecord {
    /// Instant the last handle answered. Validity counts from here.
    pub fn finished_at(&self) -> Instant {
        self.started_at + self.elapsed
    }

    pub fn successes(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == HandleOutcome::Granted)
            .count()
    }

    pub fn failures(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, HandleOutcome::Failed(_)))
            .count()
    }

    /// Handles that may hold our token after this round.
    fn possibly_written(&self) -> impl Iterator<Item = usize> + '_ {
        self.attempts
            .iter()
            .filter(|a| a.outcome != HandleOutcome::Rejected)
            .map(|a| a.index)
    }
}

/// Why a single round did not produce a lock. Both are retried as "busy".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoundFailure {
    #[error("quorum not reached: {successes} of {quorum} required")]
    QuorumNotReached { successes: usize, quorum: usize },

    #[error("quorum reached after {elapsed:?}, leaving no validity past a {drift_margin:?} drift margin")]
    ClockDriftExceeded {
        elapsed: Duration,
        drift_margin: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
enum RoundOp {
    Acquire,
    Extend,
}

/// Runs single acquisition, extension and release rounds across all stores.
///
/// Every round fans out to all handles at once and joins on the slowest one,
/// each call bounded by its own timeout, so a round costs one handle timeout
/// at worst regardless of how many stores there are.
#[derive(Clone)]
pub struct QuorumCoordinator {
    stores: Vec<Arc<dyn LockStore>>,
    quorum: usize,
    clock: ClockModel,
    per_handle_timeout: Option<Duration>,
}

impl QuorumCoordinator {
    pub fn new(
        stores: Vec<Arc<dyn LockStore>>,
        quorum: Option<usize>,
        clock: ClockModel,
        per_handle_timeout: Option<Duration>,
    ) -> Result<Self> {
        let quorum = resolve_quorum(stores.len(), quorum)?;
        Ok(Self {
            stores,
            quorum,
            clock,
            per_handle_timeout,
        })
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    pub fn clock(&self) -> &ClockModel {
        &self.clock
    }

    /// Timeout for each handle call in a round with `ttl`: the override or
    /// `ttl / N`, at least `MIN_HANDLE_TIMEOUT`, and always strictly below
    /// `ttl`.
    pub fn handle_timeout(&self, ttl: Duration) -> Duration {
        let timeout = self
            .per_handle_timeout
            .unwrap_or_else(|| ttl / self.stores.len() as u32)
            .max(MIN_HANDLE_TIMEOUT);
        if timeout >= ttl { ttl / 2 } else { timeout }
    }

    /// One acquisition round. On failure, every handle that may have
    /// written the token is released before returning.
    pub async fn acquire(
        &self,
        resources: &[String],
        token: &OwnerToken,
        ttl: Duration,
    ) -> std::result::Result<Lock, RoundFailure> {
        // Covers the caller dropping this future mid-round
        let guard = ReleaseGuard::arm(&self.stores, resources, token, self.handle_timeout(ttl));

        let record = self
            .run_round(RoundOp::Acquire, resources, token.as_str(), ttl)
            .await;

        let verdict = self.judge(&record, ttl);
        if verdict.is_err() {
            self.release_partial(&record, resources, token, ttl).await;
        }
        guard.disarm();

        verdict.map(|validity| {
            Lock::new(resources.to_vec(), token.clone(), record.finished_at(), validity)
        })
    }

    /// One extension round with an existing token. Stores that extended
    /// are left as they are on failure: the keys still belong to the
    /// holder, who can release them.
    pub async fn extend(
        &self,
        resources: &[String],
        token: &OwnerToken,
        ttl: Duration,
    ) -> std::result::Result<Lock, RoundFailure> {
        let record = self
            .run_round(RoundOp::Extend, resources, token.as_str(), ttl)
            .await;

        self.judge(&record, ttl).map(|validity| {
            Lock::new(resources.to_vec(), token.clone(), record.finished_at(), validity)
        })
    }

    /// Best-effort release on every store. Needs no quorum and never
    /// fails; returns how many stores actually deleted a key.
    pub async fn release(&self, resources: &[String], token: &OwnerToken) -> usize {
        let timeout = self.per_handle_timeout.unwrap_or(RELEASE_TIMEOUT);
        release_all(&self.stores, resources, token.as_str(), timeout).await
    }

    async fn run_round(
        &self,
        op: RoundOp,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> AttemptRecord {
        let timeout = self.handle_timeout(ttl);
        let started_at = Instant::now();

        let calls = self.stores.iter().enumerate().map(|(index, store)| async move {
            let call_started = Instant::now();
            let call = async {
                match op {
                    RoundOp::Acquire => store.try_acquire(resources, token, ttl).await,
                    RoundOp::Extend => store.try_extend(resources, token, ttl).await,
                }
            };
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(true)) => HandleOutcome::Granted,
                Ok(Ok(false)) => HandleOutcome::Rejected,
                Ok(Err(e)) => HandleOutcome::Failed(e),
                Err(_) => HandleOutcome::Failed(StoreError::Timeout(timeout)),
            };
            if let HandleOutcome::Failed(e) = &outcome {
                tracing::debug!(store = %store.describe(), error = %e, "Store call failed");
            }
            HandleAttempt {
                index,
                outcome,
                latency: call_started.elapsed(),
            }
        });

        let attempts = join_all(calls).await;
        let record = AttemptRecord {
            started_at,
            elapsed: started_at.elapsed(),
            attempts,
        };

        tracing::debug!(
            op = ?op,
            resources = ?resources,
            successes = record.successes(),
            failures = record.failures(),
            quorum = self.quorum,
            elapsed_ms = record.elapsed.as_millis() as u64,
            "Round finished"
        );
        record
    }

    fn judge(&self, record: &AttemptRecord, ttl: Duration) -> std::result::Result<Duration, RoundFailure> {
        let successes = record.successes();
        if successes < self.quorum {
            return Err(RoundFailure::QuorumNotReached {
                successes,
                quorum: self.quorum,
            });
        }
        self.clock
            .remaining_validity(ttl, record.elapsed)
            .ok_or(RoundFailure::ClockDriftExceeded {
                elapsed: record.elapsed,
                drift_margin: self.clock.drift_margin(ttl),
            })
    }

    async fn release_partial(
        &self,
        record: &AttemptRecord,
        resources: &[String],
        token: &OwnerToken,
        ttl: Duration,
    ) {
        let stores: Vec<Arc<dyn LockStore>> = record
            .possibly_written()
            .map(|i| Arc::clone(&self.stores[i]))
            .collect();
        if stores.is_empty() {
            return;
        }
        release_all(&stores, resources, token.as_str(), self.handle_timeout(ttl)).await;
    }
}

async fn release_all(
    stores: &[Arc<dyn LockStore>],
    resources: &[String],
    token: &str,
    timeout: Duration,
) -> usize {
    let calls = stores.iter().map(|store| async move {
        match tokio::time::timeout(timeout, store.try_release(resources, token)).await {
            Ok(Ok(released)) => released,
            Ok(Err(e)) => {
                tracing::warn!(store = %store.describe(), error = %e, "Release failed, key left to expire");
                false
            }
            Err(_) => {
                tracing::warn!(store = %store.describe(), timeout = ?timeout, "Release timed out, key left to expire");
                false
            }
        }
    });

    join_all(calls).await.into_iter().filter(|released| *released).count()
}

/// Releases a round's token if the round is abandoned before it finishes.
struct ReleaseGuard {
    pending: Option<PendingRelease>,
}

struct PendingRelease {
    stores: Vec<Arc<dyn LockStore>>,
    resources: Vec<String>,
    token: String,
    timeout: Duration,
}

impl ReleaseGuard {
    fn arm(
        stores: &[Arc<dyn LockStore>],
        resources: &[String],
        token: &OwnerToken,
        timeout: Duration,
    ) -> Self {
        Self {
            pending: Some(PendingRelease {
                stores: stores.to_vec(),
                resources: resources.to_vec(),
                token: token.as_str().to_string(),
                timeout,
            }),
        }
    }

    fn disarm(mut self) {
        self.pending = None;
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(resources = ?pending.resources, "Round abandoned, releasing in background");
                handle.spawn(async move {
                    release_all(
                        &pending.stores,
                        &pending.resources,
                        &pending.token,
                        pending.timeout,
                    )
                    .await;
                });
            }
            Err(_) => {
                tracing::warn!(resources = ?pending.resources, "Round abandoned outside a runtime, keys left to expire");
            }
        }
    }
}
