//! Error types for Groundwork.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! language-model, embedding, storage and request-validation failures.

use thiserror::Error;

/// Unified error type for Groundwork.
///
/// All fallible functions return `Result<T, AppError>`.
/// Transport-class variants are recoverable: the retrieval pipeline degrades
/// instead of failing when it sees them.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Language-model gateway errors (unreachable, HTTP failure)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding gateway transport errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Embedding gateway returned a vector of the wrong length
    #[error("Embedding shape error: expected {expected} dimensions, got {actual}")]
    EmbeddingShape { expected: usize, actual: usize },

    /// Chunk store (SQLite) errors
    #[error("Store error: {0}")]
    Store(String),

    /// A network or storage call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The caller supplied a request that cannot be served
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Knowledge base errors (ingestion, retrieval bookkeeping)
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error is a transport-class failure that callers may
    /// degrade around rather than report.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Llm(_)
                | AppError::Embedding(_)
                | AppError::EmbeddingShape { .. }
                | AppError::Store(_)
                | AppError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_recoverable() {
        assert!(AppError::Llm("down".into()).is_recoverable());
        assert!(AppError::Timeout("embed".into()).is_recoverable());
        assert!(AppError::EmbeddingShape {
            expected: 768,
            actual: 384
        }
        .is_recoverable());
    }

    #[test]
    fn test_request_errors_are_not_recoverable() {
        assert!(!AppError::InvalidRequest("empty query".into()).is_recoverable());
        assert!(!AppError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_shape_error_message() {
        let err = AppError::EmbeddingShape {
            expected: 1024,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "Embedding shape error: expected 1024 dimensions, got 768"
        );
    }
}
