//! # Chunk Store
//!
//! Durable storage for text chunks and their metadata, backed by a single
//! SQLite file per project. The store issues the integer ids that the vector
//! index is keyed by.
//!
//! Inserts accumulate in one open unit of work until [`ChunkStore::commit`]
//! or [`ChunkStore::rollback`]. Ids are never reused: a rollback leaves a
//! permanent gap.
//!
//! Only one process may write a project's store at a time. Opening the same
//! file from a second writer is unsupported.

pub mod chunk;
pub mod error;
pub mod store;

pub use chunk::{Chunk, ChunkId, ChunkMetadata, StoredChunk};
pub use error::{ChunkStoreError, Result};
pub use store::ChunkStore;
