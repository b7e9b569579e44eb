//! Error types for the storage core.
//!
//! - [`StoreError`] - failures reported by a backing store
//! - [`CacheError`] - failures reported by a cache store
//! - [`AppError`] - everything a caller of the orchestrator can observe
//!
//! A cache miss is not an error: cache lookups return `Ok(None)`.

use thiserror::Error;

/// Errors produced by [`crate::domain::repositories::BackingStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such link: {0}")]
    NotFound(String),

    #[error("link {0} has been deleted")]
    Deleted(String),

    #[error("no such user: {0}")]
    UserNotFound(String),

    #[error("invalid credentials for {0}")]
    Unauthorized(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Returns true for outcomes that describe the data rather than a failing store.
    ///
    /// Write-behind retries skip these: trying again cannot change the answer.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Deleted(_) | Self::UserNotFound(_) | Self::Unauthorized(_)
        )
    }
}

/// Errors produced by [`crate::infrastructure::cache::CacheStore`] implementations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache operation error: {0}")]
    Operation(String),

    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            Self::Connection(e.to_string())
        } else {
            Self::Operation(e.to_string())
        }
    }
}

/// Errors surfaced by the cache orchestrator, the task broker and the worker pool.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("no staged value for {owner}; write-behind abandoned")]
    StagedValueAbandoned { owner: String },

    #[error("task queue is closed")]
    QueueClosed,

    #[error("worker dropped the task without answering")]
    WorkerUnavailable,

    #[error("task cancelled by shutdown")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("write-behind of {owner}/{key} failed after {attempts} attempt(s): {reason}")]
    WriteBehindFailed {
        owner: String,
        key: String,
        attempts: usize,
        reason: String,
    },
}

impl AppError {
    /// Returns true if the error came from the backing store reporting a missing link.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }

    /// Returns true if the error came from the backing store reporting a deleted link.
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Store(StoreError::Deleted(_)))
    }
}
