//! Chunk value types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkStoreError, Result};

/// Identifier issued by the chunk store. Monotonic, never reused, not dense.
pub type ChunkId = i64;

/// Metadata attached to a chunk.
///
/// The common fields are typed; anything else a splitter produces lands in
/// `extra` and is round-tripped untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the document the chunk came from.
    #[serde(default, alias = "file_path", alias = "file", alias = "source")]
    pub source_path: String,

    /// 1-based page number, when the source is paginated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Open extension bag.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Create metadata for a chunk of `source_path`.
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            page: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Attach an extra key.
    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A chunk waiting to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The literal chunk content.
    pub text: String,

    /// Where the chunk came from.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Reject chunks the store would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(ChunkStoreError::EmptyText);
        }
        Ok(())
    }
}

/// A chunk as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
}
