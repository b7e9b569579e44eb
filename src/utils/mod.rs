//! Helpers shared by the binaries.
//!
//! - [`link_input`] - short key generation/validation and target normalization

pub mod link_input;
