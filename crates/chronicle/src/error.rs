//! Error types for Chronicle

use thiserror::Error;

/// Main error type for Chronicle operations
#[derive(Error, Debug)]
pub enum ChronicleError {
    /// Storage-related errors (LanceDB, in-memory collections, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reranker transport or response errors
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl From<serde_json::Error> for ChronicleError {
    fn from(e: serde_json::Error) -> Self {
        ChronicleError::Serialization(e.to_string())
    }
}

/// Result type alias for Chronicle operations
pub type Result<T> = std::result::Result<T, ChronicleError>;
