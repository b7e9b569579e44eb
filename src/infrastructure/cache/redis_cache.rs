//! Redis-backed cache implementation.

use super::service::{CacheResult, CacheStore};
use crate::error::CacheError;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deletes KEYS[1] only while it holds ARGV[1].
static DELETE_IF_EQ: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        "#,
    )
});

/// Redis cache store.
///
/// Uses connection pooling via `ConnectionManager` for efficient connection reuse.
/// Errors are returned to the caller; the orchestrator decides whether a
/// failure degrades to the backing store or fails the request.
pub struct RedisCache {
    client: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid, the connection cannot
    /// be established, or the PING health check fails.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {}", e)))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        let mut test_conn = manager.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| CacheError::Connection(format!("Redis PING failed: {}", e)))?;

        info!("✓ Connected to Redis");

        Ok(Self {
            client: manager,
            key_prefix: "weblink:".to_string(),
        })
    }

    /// Constructs the full Redis key with namespace prefix.
    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.client.clone();

        match conn.exists::<_, bool>(self.build_key(key)).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Redis EXISTS error for {}: {}", key, e);
                false
            }
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.client.clone();

        let value = conn.get::<_, Option<String>>(self.build_key(key)).await?;
        match &value {
            Some(_) => debug!("Cache HIT: {}", key),
            None => debug!("Cache MISS: {}", key),
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.client.clone();
        let ttl_seconds = ttl.as_secs().max(1);

        conn.set_ex::<_, _, ()>(self.build_key(key), value, ttl_seconds)
            .await?;
        debug!("Cache SET: {} (TTL: {}s)", key, ttl_seconds);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.client.clone();

        let deleted = conn.del::<_, i32>(self.build_key(key)).await?;
        if deleted > 0 {
            debug!("Cache DELETE: {}", key);
        }
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool> {
        let mut conn = self.client.clone();

        let deleted: i32 = DELETE_IF_EQ
            .key(self.build_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        if deleted > 0 {
            debug!("Cache DELETE (matched): {}", key);
        }
        Ok(deleted > 0)
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.client.clone();
        conn.ping::<()>().await.is_ok()
    }
}
