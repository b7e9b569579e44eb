//! Repository trait definitions for the domain layer.
//!
//! - [`BackingStore`] - authoritative link and account storage
//!
//! Implementations live in `crate::infrastructure::persistence`. A mock is
//! generated via `mockall` for unit tests.

pub mod backing_store;

pub use backing_store::{BackingStore, StoreKind};

#[cfg(test)]
pub use backing_store::MockBackingStore;
