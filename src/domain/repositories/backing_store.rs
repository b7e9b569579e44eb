//! Contract of the authoritative link store.

use crate::domain::entities::{Link, NewUser, User};
use crate::error::StoreError;
use async_trait::async_trait;
use std::fmt;

/// Identifies which backing store is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Postgres,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Repository interface for the authoritative link and account data.
///
/// The cache orchestrator only reaches storage through this trait. Concurrency
/// control (locks, transactions) is the implementation's responsibility.
///
/// # Superuser override
///
/// When `superuser` is true, owner scoping is dropped and the short key alone
/// identifies the record.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::FileLinkRepository`] - JSON flat file
/// - [`crate::infrastructure::persistence::PgLinkRepository`] - PostgreSQL
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetches a single link.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record matches.
    /// Returns [`StoreError::Deleted`] if the record is soft-deleted.
    async fn get(&self, owner: &str, key: &str, superuser: bool) -> Result<Link, StoreError>;

    /// Inserts or replaces a link.
    async fn put(&self, owner: &str, key: &str, link: Link, superuser: bool)
    -> Result<(), StoreError>;

    /// Soft-deletes a link by clearing its `active` flag.
    ///
    /// Returns the owner of the record that was deleted, which differs from
    /// `owner` when a superuser deletes someone else's link.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record matches.
    async fn delete(&self, owner: &str, key: &str, superuser: bool) -> Result<String, StoreError>;

    /// Lists the short keys of all active links owned by `owner`.
    async fn list_owned(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    /// Lists every active link across all owners.
    async fn list_all(&self) -> Result<Vec<Link>, StoreError>;

    /// Resolves a short key to its target and increments its redirect counter.
    ///
    /// The increment is atomic with respect to concurrent resolutions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Deleted`].
    async fn resolve_and_increment(&self, short_key: &str) -> Result<String, StoreError>;

    /// Registers or updates an account. Returns its uid.
    async fn put_user(&self, user: NewUser) -> Result<String, StoreError>;

    /// Fetches an account by uid.
    async fn get_user(&self, uid: &str) -> Result<User, StoreError>;

    /// Removes an account.
    async fn delete_user(&self, uid: &str) -> Result<(), StoreError>;

    /// Lists all accounts.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Returns the uid of the superuser, if one is registered.
    async fn find_superuser(&self) -> Result<Option<String>, StoreError>;

    /// Checks credentials and returns the uid on success.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unauthorized`] on a bad password or unknown name.
    async fn authenticate(&self, name: &str, password: &str) -> Result<String, StoreError>;

    /// Identifies the store implementation.
    fn kind(&self) -> StoreKind;
}
