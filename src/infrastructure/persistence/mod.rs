//! Backing store implementations.
//!
//! Concrete implementations of [`crate::domain::repositories::BackingStore`]:
//!
//! - [`FileLinkRepository`] - JSON document on local disk
//! - [`PgLinkRepository`] - PostgreSQL via SQLx

pub mod file_link_repository;
pub mod pg_link_repository;

pub use file_link_repository::FileLinkRepository;
pub use pg_link_repository::PgLinkRepository;
