//! Error types for the retrieval pipeline.

use thiserror::Error;

use maid_chunk_store::{ChunkId, ChunkStoreError};
use maid_embeddings::EmbeddingError;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval pipeline.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// An indexed id has no chunk row. Always an internal consistency failure.
    #[error("chunk {0} is indexed but has no stored row")]
    NotFound(ChunkId),

    /// An embedding's length disagrees with the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An id was added to the index twice.
    #[error("duplicate id in vector index: {0}")]
    DuplicateId(ChunkId),

    /// Input rejected before any state was touched.
    #[error("validation error: {0}")]
    Validation(String),

    /// Embedding provider error.
    #[error("embedding error: {0}")]
    Embedding(EmbeddingError),

    /// Chunk store error.
    #[error("chunk store error: {0}")]
    Store(ChunkStoreError),

    /// A document could not be read or split.
    #[error("document error: {0}")]
    Document(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            EmbeddingError::DuplicateId(id) => Self::DuplicateId(id),
            other => Self::Embedding(other),
        }
    }
}

impl From<ChunkStoreError> for RetrievalError {
    fn from(err: ChunkStoreError) -> Self {
        match err {
            ChunkStoreError::NotFound(id) => Self::NotFound(id),
            ChunkStoreError::EmptyText => {
                Self::Validation("chunk text must not be empty".to_string())
            }
            other => Self::Store(other),
        }
    }
}

impl From<toml::de::Error> for RetrievalError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
