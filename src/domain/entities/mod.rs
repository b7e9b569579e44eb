//! Core domain entities.
//!
//! - [`Link`] - A short key owned by a user, pointing at a target URL
//! - [`User`] - An account that owns links
//!
//! Entities are plain serde-serializable data. They travel through the cache
//! as JSON, so field renames are cache-format changes.

pub mod link;
pub mod user;

pub use link::{Link, storage_key};
pub use user::{NewUser, User, UserRole, hash_secret};
