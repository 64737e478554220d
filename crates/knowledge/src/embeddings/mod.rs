//! Embedding Gateway.
//!
//! Converts text to fixed-length vectors through a pluggable provider.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
