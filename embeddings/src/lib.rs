//! # Embeddings
//!
//! This crate turns text into dense vectors and answers nearest-neighbour
//! queries over them for the research-maid citation matcher.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to fixed-length vectors
//! - **Flat L2 Search**: Exhaustive nearest-neighbour search by Euclidean distance
//! - **Multiple Providers**: OpenAI-compatible HTTP endpoints and an offline hashing model
//! - **Snapshots**: JSON persistence of the index, keyed by chunk id
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► FlatIndex                  │
//! │       │                                  │                      │
//! │       ▼                                  ▼                      │
//! │  OpenAI/Hashing                  search(query, k) ──► Neighbor  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{FlatIndex, IndexEntry, Neighbor, VectorId};
pub use provider::{EmbeddingProvider, HashingProvider, OpenAIProvider};
pub use similarity::{l2_distance, normalize, squared_l2_distance};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings when nothing else is configured
/// (paraphrase-multilingual-MiniLM-L12-v2).
pub const DEFAULT_DIMENSION: usize = 384;
