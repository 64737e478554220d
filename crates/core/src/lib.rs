//! Groundwork Core Library
//!
//! This crate provides the foundational utilities shared by every Groundwork crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (including the retrieval feature settings)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingSettings, LlmSettings, RetrievalConfig};
pub use error::{AppError, AppResult};
