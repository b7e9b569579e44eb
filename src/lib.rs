//! # weblink
//!
//! Storage core of a short-link service: a caching layer between callers and
//! an authoritative backing store (JSON flat file or PostgreSQL).
//!
//! ## Architecture
//!
//! - **Domain Layer** ([`domain`]) - Entities, the [`BackingStore`](domain::repositories::BackingStore)
//!   contract and the per-call [`RequestContext`](domain::context::RequestContext)
//! - **Application Layer** ([`application`]) - The [`CacheOrchestrator`], invalidation
//!   policy, task broker and worker pool
//! - **Infrastructure Layer** ([`infrastructure`]) - Redis/in-process caches and
//!   file/PostgreSQL stores
//!
//! ## Cache modes
//!
//! - **cache-aside** - writes go straight to the store, cached listings are
//!   invalidated afterwards
//! - **write-back** - writes are staged in the cache and committed by a fixed
//!   pool of workers; callers get success before the store is updated
//!
//! ## Quick Start
//!
//! ```bash
//! export STORAGE_TYPE=file STORAGE_PATH=storage.json
//! export CACHE_MODE=write-back
//! cargo run
//! ```
//!
//! ## Configuration
//!
//! Loaded from environment variables via [`config::Config`].
//! See [`config`] module for available options.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod runtime;
pub mod utils;

pub use application::CacheOrchestrator;
pub use error::AppError;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::workers::{QueueRouting, ShutdownReport, WriteReceipt};
    pub use crate::application::{CacheMode, CacheOrchestrator, OrchestratorSettings};
    pub use crate::domain::context::RequestContext;
    pub use crate::domain::entities::{Link, NewUser, User, UserRole};
    pub use crate::domain::repositories::{BackingStore, StoreKind};
    pub use crate::error::{AppError, CacheError, StoreError};
    pub use crate::infrastructure::cache::{CacheStore, CacheStoreExt, MemoryCache};
    pub use crate::infrastructure::persistence::FileLinkRepository;
}
