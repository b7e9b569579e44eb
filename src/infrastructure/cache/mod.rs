//! Caching layer between callers and the backing store.
//!
//! Provides a [`CacheStore`] trait with two implementations:
//! - [`RedisCache`] - Production Redis-backed cache
//! - [`MemoryCache`] - In-process cache for single-node setups and tests
//!
//! Key layout is defined in [`keys`].

pub mod keys;
mod memory_cache;
mod redis_cache;
mod service;

pub use memory_cache::MemoryCache;
pub use redis_cache::RedisCache;
pub use service::{CacheResult, CacheStore, CacheStoreExt};
