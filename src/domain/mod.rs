//! Domain layer containing business entities and storage contracts.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Backing store contract
//! - [`context`] - Request deadline propagated into background work
//!
//! The domain layer has no dependencies on infrastructure or application code.

pub mod context;
pub mod entities;
pub mod repositories;
