//! # Retrieval
//!
//! Project-scoped ingest and citation matching on top of the chunk store and
//! the vector index.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Session                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ingest:  chunks ──► EmbeddingProvider ──► vectors              │
//! │                                              │                  │
//! │                ┌─────────────────────────────┤                  │
//! │                ▼                             ▼                  │
//! │         ┌──────────────┐             ┌──────────────┐           │
//! │         │  ChunkStore  │  same id    │  FlatIndex   │           │
//! │         │   (SQLite)   │◄───────────►│  (resident)  │           │
//! │         └──────────────┘             └──────────────┘           │
//! │           commit ──────────────────────► flush                  │
//! │                                                                 │
//! │  query:   text ──► vector ──► search ──► ids ──► rows ──► hits  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use maid_retrieval::{Projects, RetrievalConfig, Session};
//!
//! let config = RetrievalConfig::discover()?;
//! let project = Projects::new(&config.projects_dir).open("thesis")?;
//! let mut session = Session::from_config(config)?;
//!
//! let hits = session.query(&project, &["Alpha method description".to_string()], 5)?;
//! ```

pub mod config;
pub mod error;
pub mod persistence;
pub mod project;
pub mod review;
pub mod session;
pub mod splitter;

pub use config::{
    EmbeddingConfig, EmbeddingProviderType, IngestConfig, QueryConfig, RetrievalConfig,
    SplitterConfig,
};
pub use error::{Result, RetrievalError};
pub use persistence::{IndexManager, ResidentIndex, SideEntry};
pub use project::{DuplicatePolicy, Manifest, Project, Projects, StagedDocument};
pub use review::{HitMeta, ReviewEntry, ReviewHit, ReviewLimits, ReviewPayload};
pub use session::{ConsistencyReport, IngestReport, QueryHit, Session};
pub use splitter::{DocumentSplitter, FileSplitter, RecursiveSplitter};

// Re-export from dependencies for convenience
pub use maid_chunk_store::{Chunk, ChunkId, ChunkMetadata};
pub use maid_embeddings::{EmbeddingProvider, HashingProvider, OpenAIProvider};
