//! Cache store trait and typed helpers.

use crate::error::CacheError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value cache shared by request handlers and background workers.
///
/// Implementations must be safe for concurrent per-key use without any
/// locking by the caller. Values are opaque strings; see [`CacheStoreExt`]
/// for JSON-typed access.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisCache`] - Redis-backed cache
/// - [`crate::infrastructure::cache::MemoryCache`] - in-process cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Checks whether `key` holds a live value.
    ///
    /// Backend failures are logged and reported as absent.
    async fn exists(&self, key: &str) -> bool;

    /// Retrieves the raw value under `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` on hit
    /// - `Ok(None)` on miss
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Removes `key` only if it still holds exactly `expected`.
    ///
    /// The comparison and the removal are atomic with respect to concurrent
    /// writers. Returns true if the entry was removed.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool>;

    /// Checks if the cache backend is reachable.
    async fn health_check(&self) -> bool;
}

/// JSON encode/decode on top of any [`CacheStore`].
#[async_trait]
pub trait CacheStoreExt: CacheStore {
    /// Retrieves and decodes the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Codec`] if the stored value does not decode as `T`.
    async fn get_json<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encodes `value` and stores it under `key` for `ttl`.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }
}

impl<C: CacheStore + ?Sized> CacheStoreExt for C {}
