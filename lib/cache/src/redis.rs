//! Redis cache backend.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use crate::{CacheError, KvCache};

/// Shared Redis cache.
///
/// Uses a multiplexed connection manager, so the handle is cheap to clone
/// and safe to share across request tasks. Every command is bounded by the
/// configured operation timeout.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connects to Redis at the given URL.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Connection` if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connection {
            reason: e.to_string(),
        })?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection {
                reason: e.to_string(),
            })?;

        Ok(Self {
            manager,
            op_timeout,
        })
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Backend {
                reason: e.to_string(),
            }),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        self.bounded(async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        let value = value.to_string();
        // Redis expiry has whole-second granularity; round up so a short
        // TTL never becomes zero (which SET EX rejects).
        let secs = ttl.as_secs().max(1);
        self.bounded(async move { conn.set_ex::<_, _, ()>(key, value, secs).await })
            .await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        // GETDEL is atomic on the server, so concurrent consumers of the
        // same key cannot both observe the value.
        self.bounded(async move { conn.get_del::<_, Option<String>>(key).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        self.bounded(async move { conn.del::<_, ()>(key).await }).await
    }
}
