//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for data persistence and caching.
//!
//! # Modules
//!
//! - [`cache`] - Cache stores (Redis and in-process implementations)
//! - [`persistence`] - Backing stores (flat file and PostgreSQL)

pub mod cache;
pub mod persistence;
