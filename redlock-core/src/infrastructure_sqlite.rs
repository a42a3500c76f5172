//! SQLite-backed LockStore implementation.
//! Each database file acts as one independent lock instance.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! redlock-core = { path = "../redlock-core", features = ["sqlite"] }
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::infrastructure::LockStore;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn ttl_millis(ttl: Duration) -> Result<i64, StoreError> {
    i64::try_from(ttl.as_millis())
        .map_err(|_| StoreError::Backend(format!("ttl {:?} out of range", ttl)))
}

fn expiry(now: i64, ttl_ms: i64) -> Result<i64, rusqlite::Error> {
    now.checked_add(ttl_ms)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, ttl_ms))
}

/// A lock instance backed by one SQLite file.
///
/// Expiry is a wall-clock column checked on every read, so a key left by a
/// crashed holder frees itself without a sweeper. Every operation runs as a
/// single `IMMEDIATE` transaction on the blocking pool.
///
/// Jobs take the connection in call order, and a job that already holds it
/// keeps it until it commits even if its caller stopped waiting. A cleanup
/// release queued behind a timed-out acquire therefore always sees that
/// acquire's write.
pub struct SqliteLockStore {
    path: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLockStore {
    /// Open (or create) a lock database at the given path.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        // WAL lets several processes share one file as a store instance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_millis(50))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS locks (
                resource   TEXT PRIMARY KEY,
                token      TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_locks_expires ON locks(expires_at);",
        )?;

        Ok(Self {
            path: path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        // Taken here rather than on the pool, so queued jobs keep their order
        let mut conn = Arc::clone(&self.conn).lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut conn).map_err(backend))
            .await
            .map_err(|e| StoreError::Backend(format!("sqlite worker failed: {}", e)))?
    }

    fn live_token(
        conn: &Connection,
        resource: &str,
        now: i64,
    ) -> Result<Option<String>, rusqlite::Error> {
        conn.query_row(
            "SELECT token FROM locks WHERE resource = ?1 AND expires_at > ?2",
            params![resource, now],
            |row| row.get(0),
        )
        .optional()
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn try_acquire(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let resources = resources.to_vec();
        let token = token.to_string();
        let ttl_ms = ttl_millis(ttl)?;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_ms();
            for resource in &resources {
                if Self::live_token(&tx, resource, now)?.is_some() {
                    return Ok(false);
                }
            }
            for resource in &resources {
                // Replaces an expired row, if any
                tx.execute(
                    "INSERT OR REPLACE INTO locks (resource, token, expires_at) VALUES (?1, ?2, ?3)",
                    params![resource, token, expiry(now, ttl_ms)?],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn try_release(&self, resources: &[String], token: &str) -> Result<bool, StoreError> {
        let resources = resources.to_vec();
        let token = token.to_string();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_ms();
            let mut deleted = 0;
            for resource in &resources {
                deleted += tx.execute(
                    "DELETE FROM locks WHERE resource = ?1 AND token = ?2 AND expires_at > ?3",
                    params![resource, token, now],
                )?;
            }
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn try_extend(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let resources = resources.to_vec();
        let token = token.to_string();
        let ttl_ms = ttl_millis(ttl)?;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_ms();
            for resource in &resources {
                if Self::live_token(&tx, resource, now)?.as_deref() != Some(token.as_str()) {
                    return Ok(false);
                }
            }
            for resource in &resources {
                tx.execute(
                    "UPDATE locks SET expires_at = ?1 WHERE resource = ?2 AND token = ?3",
                    params![expiry(now, ttl_ms)?, resource, token],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}
