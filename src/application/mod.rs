//! Application layer: the caching core.
//!
//! - [`orchestrator::CacheOrchestrator`] - caller-facing storage contract with caching
//! - [`invalidation`] - which cache entries a mutation flushes
//! - [`workers`] - task broker and worker pool backing write-back mode

pub mod invalidation;
pub mod orchestrator;
pub mod workers;

pub use orchestrator::{CacheMode, CacheOrchestrator, OrchestratorSettings};
