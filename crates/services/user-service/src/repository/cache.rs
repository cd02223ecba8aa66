//! Read-through cache for user snapshots.
//!
//! Entries are JSON-serialized [`User`] values stored under
//! `"{prefix}: {key}"`. The cache is never authoritative: callers treat
//! every error, including a miss, as "go to the store".

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, RedisResult};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;

use common::CacheConfig;
use domain::User;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Cache failure kinds. `Miss` is expected and non-fatal.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,

    #[error("cache operation timed out")]
    Timeout,

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// User cache trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<User>;

    async fn set(&self, key: &str, ttl: Duration, user: &User) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

// =============================================================================
// Redis
// =============================================================================

/// Redis cache with a shared multiplexed connection.
#[derive(Clone)]
pub struct RedisUserCache {
    connection: ConnectionManager,
    key_prefix: String,
    operation_timeout: Duration,
}

impl RedisUserCache {
    /// Connect to Redis; the connect itself is bounded by the operation timeout.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let operation_timeout = Duration::from_millis(config.operation_timeout_ms);
        let client = Client::open(config.url.as_str())?;
        let connection = timeout(operation_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)??;

        tracing::info!("Redis cache connected");

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            operation_timeout,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}: {}", self.key_prefix, key)
    }

    async fn bounded<T>(&self, op: impl Future<Output = RedisResult<T>>) -> CacheResult<T> {
        match timeout(self.operation_timeout, op).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, key: &str) -> CacheResult<User> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        let value: Option<String> = self.bounded(conn.get(&key)).await?;

        let json = value.ok_or(CacheError::Miss)?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn set(&self, key: &str, ttl: Duration, user: &User) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        let json = serde_json::to_string(user)?;

        // SET EX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        self.bounded(conn.set_ex::<_, _, ()>(&key, json, seconds))
            .await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let key = self.key(key);
        self.bounded(conn.del::<_, ()>(&key)).await
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local cache with per-entry expiry.
#[derive(Default)]
pub struct InMemoryUserCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryUserCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserCache for InMemoryUserCache {
    async fn get(&self, key: &str) -> CacheResult<User> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((json, expires_at)) if *expires_at > Instant::now() => {
                Ok(serde_json::from_str(json)?)
            }
            _ => Err(CacheError::Miss),
        }
    }

    async fn set(&self, key: &str, ttl: Duration, user: &User) -> CacheResult<()> {
        let json = serde_json::to_string(user)?;
        let expires_at = Instant::now() + ttl;

        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, at)| *at > Instant::now());
        entries.insert(key.to_string(), (json, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Cache that never holds anything; every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUserCache;

#[async_trait]
impl UserCache for NoopUserCache {
    async fn get(&self, _key: &str) -> CacheResult<User> {
        Err(CacheError::Miss)
    }

    async fn set(&self, _key: &str, _ttl: Duration, _user: &User) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }
}
