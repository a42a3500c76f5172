//! Redis-backed LockStore implementation.
//!
//! One `RedisLockStore` talks to one independent Redis instance (or one
//! logical db on it). All three operations are Lua scripts so that each is
//! atomic on the server for the whole resource set.
//!
//! Enable with the `redis` feature flag:
//! ```toml
//! redlock-core = { path = "../redlock-core", features = ["redis"] }
//! ```

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use tokio::sync::OnceCell;

use crate::config::StoreEndpoint;
use crate::error::StoreError;
use crate::infrastructure::LockStore;

static ACQUIRE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        for _, key in ipairs(KEYS) do
            if redis.call("EXISTS", key) == 1 then
                return 0
            end
        end
        for _, key in ipairs(KEYS) do
            redis.call("SET", key, ARGV[1], "PX", ARGV[2])
        end
        return #KEYS
        "#,
    )
});

static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local deleted = 0
        for _, key in ipairs(KEYS) do
            if redis.call("GET", key) == ARGV[1] then
                deleted = deleted + redis.call("DEL", key)
            end
        end
        return deleted
        "#,
    )
});

static EXTEND_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        for _, key in ipairs(KEYS) do
            if redis.call("GET", key) ~= ARGV[1] then
                return 0
            end
        end
        for _, key in ipairs(KEYS) do
            redis.call("PEXPIRE", key, ARGV[2])
        end
        return #KEYS
        "#,
    )
});

fn store_error(e: RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(Duration::ZERO)
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

/// PX / PEXPIRE argument for `ttl`. Rejects values that do not fit in
/// whole milliseconds as a signed 64-bit integer.
pub(crate) fn ttl_arg(ttl: Duration) -> Result<i64, StoreError> {
    i64::try_from(ttl.as_millis())
        .map_err(|_| StoreError::Backend(format!("ttl {:?} out of range", ttl)))
}

/// Lock store over a single Redis instance.
///
/// The connection is established lazily on first use and then shared: the
/// `ConnectionManager` multiplexes concurrent rounds and reconnects on its
/// own after a drop.
pub struct RedisLockStore {
    url: String,
    client: Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisLockStore {
    /// Create a store for a Redis connection URL (e.g. "redis://10.0.0.1:6379/0").
    /// Does not connect yet.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(store_error)?;
        Ok(Self {
            url: url.to_string(),
            client,
            conn: OnceCell::new(),
        })
    }

    pub fn from_endpoint(endpoint: &StoreEndpoint) -> Result<Self, StoreError> {
        Self::new(&endpoint.to_url())
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(store_error)
            })
            .await
            .cloned()
    }

    async fn invoke(
        &self,
        script: &Script,
        resources: &[String],
        token: &str,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let ttl = ttl.map(ttl_arg).transpose()?;
        let mut conn = self.connection().await?;

        let mut invocation = script.prepare_invoke();
        for resource in resources {
            invocation.key(resource.as_str());
        }
        invocation.arg(token);
        if let Some(ttl) = ttl {
            invocation.arg(ttl);
        }

        invocation.invoke_async(&mut conn).await.map_err(store_error)
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let created = self
            .invoke(&ACQUIRE_SCRIPT, resources, token, Some(ttl))
            .await?;
        Ok(created > 0)
    }

    async fn try_release(&self, resources: &[String], token: &str) -> Result<bool, StoreError> {
        let deleted = self.invoke(&RELEASE_SCRIPT, resources, token, None).await?;
        Ok(deleted > 0)
    }

    async fn try_extend(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let extended = self
            .invoke(&EXTEND_SCRIPT, resources, token, Some(ttl))
            .await?;
        Ok(extended > 0)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
