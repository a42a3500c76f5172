use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::infrastructure::LockStore;

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A single in-process store instance.
///
/// Expiry uses the Tokio clock, so tests running with a paused clock can
/// advance time to expire keys. Two knobs simulate a misbehaving instance:
/// `set_unavailable` makes every call fail, and `set_latency` delays the
/// reply *after* the mutation has been applied, like a slow network path.
pub struct InMemoryLockStore {
    name: String,
    // Map of resource -> current holder
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryLockStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Token currently holding `resource`, if the key is live.
    pub fn holder(&self, resource: &str) -> Option<String> {
        let now = Instant::now();
        self.entries()
            .get(resource)
            .filter(|e| e.is_live(now))
            .map(|e| e.token.clone())
    }

    /// Remaining time-to-live of `resource`, if the key is live.
    pub fn ttl_of(&self, resource: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries()
            .get(resource)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the guard cannot leave a half-applied
        // operation behind: every mutation below is a single map update.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!(
                "{}: connection refused",
                self.name
            )))
        } else {
            Ok(())
        }
    }

    async fn respond<T>(&self, value: T) -> Result<T, StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(value)
    }

    fn deadline(&self, now: Instant, ttl: Duration) -> Result<Instant, StoreError> {
        now.checked_add(ttl).ok_or_else(|| {
            StoreError::Backend(format!("{}: ttl {:?} out of range", self.name, ttl))
        })
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let expires_at = self.deadline(now, ttl)?;

        let acquired = {
            let mut entries = self.entries();
            // Expired keys are treated as absent
            let free = resources
                .iter()
                .all(|r| entries.get(r).is_none_or(|e| !e.is_live(now)));
            if free {
                for resource in resources {
                    entries.insert(
                        resource.clone(),
                        Entry {
                            token: token.to_string(),
                            expires_at,
                        },
                    );
                }
            }
            free
        };

        self.respond(acquired).await
    }

    async fn try_release(&self, resources: &[String], token: &str) -> Result<bool, StoreError> {
        self.check_available()?;

        let released = {
            let now = Instant::now();
            let mut entries = self.entries();
            let mut deleted = 0;
            for resource in resources {
                let owned = entries
                    .get(resource)
                    .is_some_and(|e| e.is_live(now) && e.token == token);
                if owned {
                    entries.remove(resource);
                    deleted += 1;
                }
            }
            deleted > 0
        };

        self.respond(released).await
    }

    async fn try_extend(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let expires_at = self.deadline(now, ttl)?;

        let extended = {
            let mut entries = self.entries();
            let owned = resources.iter().all(|r| {
                entries
                    .get(r)
                    .is_some_and(|e| e.is_live(now) && e.token == token)
            });
            if owned {
                for resource in resources {
                    if let Some(entry) = entries.get_mut(resource) {
                        entry.expires_at = expires_at;
                    }
                }
            }
            owned
        };

        self.respond(extended).await
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }
}
