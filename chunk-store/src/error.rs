//! Error types for the chunk store.

use thiserror::Error;

use crate::chunk::ChunkId;

/// Result type alias for chunk store operations.
pub type Result<T> = std::result::Result<T, ChunkStoreError>;

/// Errors that can occur in the chunk store.
#[derive(Error, Debug)]
pub enum ChunkStoreError {
    /// No row has this id.
    #[error("chunk not found: {0}")]
    NotFound(ChunkId),

    /// Chunk text was empty or whitespace.
    #[error("chunk text must not be empty")]
    EmptyText,

    /// A stored row could not be decoded.
    #[error("invalid row {id}: {reason}")]
    InvalidRow { id: ChunkId, reason: String },

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
