//! Link entity representing a short key owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short link record.
///
/// The backing store holds the authoritative copy. Anything the cache layer
/// keeps (staged writes, listings) is a transient copy of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub owner: String,
    pub short_key: String,
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub redirect_count: u64,
}

impl Link {
    /// Creates a new active link with a zero redirect counter.
    pub fn new(
        owner: impl Into<String>,
        short_key: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            short_key: short_key.into(),
            target: target.into(),
            created_at: Utc::now(),
            active: true,
            redirect_count: 0,
        }
    }

    /// Returns true if the link has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        !self.active
    }

    /// Map key used by stores that index links as `owner:short_key`.
    pub fn storage_key(&self) -> String {
        storage_key(&self.owner, &self.short_key)
    }
}

/// Builds the `owner:short_key` index key.
pub fn storage_key(owner: &str, short_key: &str) -> String {
    format!("{}:{}", owner, short_key)
}
