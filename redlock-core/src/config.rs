//! Manager configuration: the serde-facing [`RedlockConfig`] and the
//! runtime [`ManagerOptions`] / [`RetryPolicy`] it resolves into.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::{ClockModel, DEFAULT_CLOCK_RESOLUTION, DEFAULT_DRIFT_FACTOR};
use crate::error::{RedlockError, Result};
use crate::quorum::{resolve_quorum, MIN_STORES};

pub const DEFAULT_TTL: Duration = Duration::from_secs(10);
/// Largest TTL a lock may carry, about 49.7 days. Fits every backend's
/// millisecond expiry arithmetic.
pub const MAX_TTL: Duration = Duration::from_millis(u32::MAX as u64);
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MIN: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_DELAY_MAX: Duration = Duration::from_millis(200);

// ─── Store Endpoints ────────────────────────────────────────────────────────

/// Address of one independent store instance: host, port and db index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreEndpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub db: i64,
}

impl StoreEndpoint {
    pub fn new(host: impl Into<String>, port: u16, db: i64) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Redis connection URL for this endpoint.
    pub fn to_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

impl fmt::Display for StoreEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Parses `host:port` or `host:port/db`.
impl FromStr for StoreEndpoint {
    type Err = RedlockError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| {
            RedlockError::Configuration(format!("invalid store endpoint '{}': {}", s, why))
        };

        let (addr, db) = match s.split_once('/') {
            Some((addr, db)) => {
                let db = db.parse::<i64>().map_err(|_| invalid("db must be an integer"))?;
                (addr, db)
            }
            None => (s, 0),
        };
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port[/db]"))?;
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("port must be 0-65535"))?;

        Ok(Self::new(host, port, db))
    }
}

// ─── Retry Policy ───────────────────────────────────────────────────────────

/// How many rounds an acquisition may take, and how long to back off
/// between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of rounds, including the first
    pub retry_count: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retry_count,
            min_delay,
            max_delay,
        }
    }

    /// A single round, no backoff.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_count == 0 {
            return Err(RedlockError::Configuration(
                "retry_count must be at least 1".to_string(),
            ));
        }
        if self.min_delay > self.max_delay {
            return Err(RedlockError::Configuration(format!(
                "retry delay range is inverted: {:?} > {:?}",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// Uniform random backoff within `[min_delay, max_delay]`.
    ///
    /// Contending callers that failed the same round would otherwise retry
    /// in lockstep and keep splitting the stores between them.
    pub fn next_delay(&self) -> Duration {
        if self.min_delay >= self.max_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_micros() as u64;
        let max = self.max_delay.as_micros() as u64;
        Duration::from_micros(rand::rng().random_range(min..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_COUNT,
            DEFAULT_RETRY_DELAY_MIN,
            DEFAULT_RETRY_DELAY_MAX,
        )
    }
}

// ─── Manager Options ────────────────────────────────────────────────────────

/// Runtime settings of a [`LockManager`](crate::manager::LockManager),
/// independent of how its stores are reached.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    /// Overrides the derived majority `floor(N/2) + 1`
    pub quorum: Option<usize>,
    /// TTL used by `acquire_default`
    pub default_ttl: Duration,
    pub retry: RetryPolicy,
    pub clock: ClockModel,
    /// Overrides the derived per-handle timeout `ttl / N`
    pub per_handle_timeout: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            quorum: None,
            default_ttl: DEFAULT_TTL,
            retry: RetryPolicy::default(),
            clock: ClockModel::default(),
            per_handle_timeout: None,
        }
    }
}

// ─── Serialized Configuration ───────────────────────────────────────────────

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_delay_ms() -> [u64; 2] {
    [
        DEFAULT_RETRY_DELAY_MIN.as_millis() as u64,
        DEFAULT_RETRY_DELAY_MAX.as_millis() as u64,
    ]
}

fn default_drift_factor() -> f64 {
    DEFAULT_DRIFT_FACTOR
}

/// Recognized configuration options, as read from a JSON document.
///
/// ```json
/// {
///   "store_endpoints": [
///     { "host": "127.0.0.1", "port": 6379, "db": 0 },
///     { "host": "127.0.0.1", "port": 6379, "db": 1 },
///     { "host": "127.0.0.1", "port": 6379, "db": 2 }
///   ],
///   "retry_count": 10,
///   "retry_delay_ms": [200, 400]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedlockConfig {
    #[serde(default)]
    pub store_endpoints: Vec<StoreEndpoint>,
    #[serde(default)]
    pub quorum: Option<usize>,
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: [u64; 2],
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,
    #[serde(default)]
    pub per_handle_timeout_ms: Option<u64>,
}

impl Default for RedlockConfig {
    fn default() -> Self {
        Self {
            store_endpoints: Vec::new(),
            quorum: None,
            default_ttl_ms: default_ttl_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            drift_factor: default_drift_factor(),
            per_handle_timeout_ms: None,
        }
    }
}

impl RedlockConfig {
    /// Checks everything that can be checked without connecting.
    pub fn validate(&self) -> Result<()> {
        if self.store_endpoints.len() < MIN_STORES {
            return Err(RedlockError::Configuration(format!(
                "at least {} store endpoints are required, got {}",
                MIN_STORES,
                self.store_endpoints.len()
            )));
        }
        resolve_quorum(self.store_endpoints.len(), self.quorum)?;
        validate_options(&self.options())
    }

    /// Resolves the runtime options. Does not validate.
    pub fn options(&self) -> ManagerOptions {
        let [min, max] = self.retry_delay_ms;
        ManagerOptions {
            quorum: self.quorum,
            default_ttl: Duration::from_millis(self.default_ttl_ms),
            retry: RetryPolicy::new(
                self.retry_count,
                Duration::from_millis(min),
                Duration::from_millis(max),
            ),
            clock: ClockModel::new(self.drift_factor, DEFAULT_CLOCK_RESOLUTION),
            per_handle_timeout: self.per_handle_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Store-count independent checks on resolved options.
pub(crate) fn validate_options(options: &ManagerOptions) -> Result<()> {
    options.retry.validate()?;

    let factor = options.clock.drift_factor();
    if !(0.0..1.0).contains(&factor) {
        return Err(RedlockError::Configuration(format!(
            "drift_factor must be within [0, 1), got {}",
            factor
        )));
    }
    if options.default_ttl.is_zero() {
        return Err(RedlockError::Configuration(
            "default_ttl must be greater than 0".to_string(),
        ));
    }
    if options.default_ttl > MAX_TTL {
        return Err(RedlockError::Configuration(format!(
            "default_ttl must not exceed {:?}",
            MAX_TTL
        )));
    }
    if options.per_handle_timeout.is_some_and(|t| t.is_zero()) {
        return Err(RedlockError::Configuration(
            "per_handle_timeout must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
