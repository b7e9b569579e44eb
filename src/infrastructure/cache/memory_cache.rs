//! In-process cache implementation.

use super::service::{CacheResult, CacheStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// A TTL-aware cache held in process memory.
///
/// Used when Redis is not configured and in tests. Expired entries are
/// dropped lazily when touched.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        debug!("Using MemoryCache (in-process)");
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        // The read guard must be released before `remove_if` locks the shard.
        let value = {
            let entry = self.entries.get(key)?;
            (entry.expires_at > now).then(|| entry.value.clone())
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        value
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn exists(&self, key: &str) -> bool {
        self.live_value(key).is_some()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value = self.live_value(key);
        match &value {
            Some(_) => debug!("Cache HIT: {}", key),
            None => debug!("Cache MISS: {}", key),
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        debug!("Cache SET: {} (TTL: {}s)", key, ttl.as_secs());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if self.entries.remove(key).is_some() {
            debug!("Cache DELETE: {}", key);
        }
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, e| e.expires_at > now && e.value == expected)
            .is_some();
        if removed {
            debug!("Cache DELETE (matched): {}", key);
        }
        Ok(removed)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
