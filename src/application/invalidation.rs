//! Cache invalidation policy.
//!
//! Anything that changes the set of keys an owner holds, or the contents of a
//! record, flushes `list:<owner>` and `all:`. Redirect counting only touches
//! `all:`. Invalidation never fails the caller: backend errors are logged and
//! the stale entry is left to expire.
//!
//! Every flush bumps an epoch of the flushed key. A reader records the epoch
//! before it reads the backing store and only caches its result if no flush
//! happened meanwhile, so a listing read before a commit cannot outlive the
//! commit's flush. Epochs live in process memory.

use crate::infrastructure::cache::keys::{ALL_KEY, list_key};
use crate::infrastructure::cache::{CacheStore, CacheStoreExt};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Flushes cached aggregates and guards their repopulation.
pub struct Invalidator {
    cache: Arc<dyn CacheStore>,
    epochs: DashMap<String, u64>,
}

impl Invalidator {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            cache,
            epochs: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Current epoch of `key`. Record it before reading the backing store.
    pub fn epoch(&self, key: &str) -> u64 {
        self.epochs.get(key).map_or(0, |epoch| *epoch)
    }

    /// Deletes `key` if it is present.
    ///
    /// Removing an absent key is a no-op and leaves the cache unchanged.
    pub async fn invalidate(&self, key: &str) {
        // Bump first: a populate that misses the bump is still caught by the delete.
        *self.epochs.entry(key.to_string()).or_insert(0) += 1;

        match self.cache.delete(key).await {
            Ok(()) => debug!(key, "invalidated"),
            Err(e) => warn!(key, error = %e, "cache invalidation failed"),
        }
    }

    /// Flushes the aggregates that depend on `owner`'s records.
    pub async fn flush_owner(&self, owner: &str) {
        self.invalidate(&list_key(owner)).await;
        self.invalidate(ALL_KEY).await;
    }

    /// Flushes the global listing only.
    pub async fn flush_all(&self) {
        self.invalidate(ALL_KEY).await;
    }

    /// Caches `value` under `key` unless `key` was flushed since epoch `seen`.
    ///
    /// Returns true if the value was left in the cache.
    pub async fn populate<T>(&self, key: &str, value: &T, ttl: Duration, seen: u64) -> bool
    where
        T: Serialize + Sync,
    {
        if self.epoch(key) != seen {
            debug!(key, "Skipping populate of a flushed key");
            return false;
        }

        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            warn!(key, error = %e, "Failed to populate cache");
            return false;
        }

        // A flush that raced with the set may have run before it landed.
        if self.epoch(key) != seen {
            debug!(key, "Key flushed during populate, dropping stale value");
            if let Err(e) = self.cache.delete(key).await {
                warn!(key, error = %e, "Failed to drop stale cache entry");
            }
            return false;
        }
        true
    }
}
