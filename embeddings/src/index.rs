//! Flat L2 index over chunk embeddings.

use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::squared_l2_distance;

/// Identifier of an indexed vector. Always the id of the chunk it embeds.
pub type VectorId = i64;

const SNAPSHOT_VERSION: u32 = 1;

/// An entry in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Chunk id this vector belongs to.
    pub id: VectorId,

    /// The embedding vector, stored as given.
    pub embedding: Embedding,
}

/// One search result: an indexed id and its L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: VectorId,
    pub distance: f32,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    dimension: usize,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// An exhaustive nearest-neighbour index keyed by explicit ids.
///
/// Every search compares the query against every stored vector, so results
/// are exact and ties resolve to insertion order. Entries are kept in the
/// order they were added, which is also the order they are snapshotted in.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    /// Stored entries in insertion order.
    entries: Vec<IndexEntry>,

    /// Position of each id in `entries`.
    positions: HashMap<VectorId, usize>,

    /// Expected dimension of embeddings.
    dimension: usize,
}

impl FlatIndex {
    /// Create a new, empty index.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            dimension,
        }
    }

    /// Dimension every stored vector must have.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add an embedding under an explicit id.
    ///
    /// Existing ids are never overwritten.
    pub fn add(&mut self, id: VectorId, embedding: Embedding) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        if self.positions.contains_key(&id) {
            return Err(EmbeddingError::DuplicateId(id));
        }

        self.positions.insert(id, self.entries.len());
        self.entries.push(IndexEntry { id, embedding });
        debug!("Added embedding to index: {id}");

        Ok(())
    }

    /// Remove an embedding from the index.
    pub fn remove(&mut self, id: VectorId) -> Option<IndexEntry> {
        let position = self.positions.remove(&id)?;
        let entry = self.entries.remove(position);
        self.reindex_from(position);
        Some(entry)
    }

    /// Remove every listed id that is present. Returns how many were removed.
    pub fn remove_many(&mut self, ids: &[VectorId]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.id));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.positions.clear();
            self.reindex_from(0);
            debug!("Removed {removed} embeddings from index");
        }
        removed
    }

    fn reindex_from(&mut self, start: usize) {
        for (position, entry) in self.entries.iter().enumerate().skip(start) {
            self.positions.insert(entry.id, position);
        }
    }

    /// Get an embedding by ID.
    pub fn get(&self, id: VectorId) -> Option<&IndexEntry> {
        self.positions.get(&id).map(|&p| &self.entries[p])
    }

    /// Check if an ID exists in the index.
    pub fn contains(&self, id: VectorId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Find the `k` entries closest to `query` by L2 distance.
    ///
    /// Results are sorted by ascending distance, ties in insertion order.
    /// An empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        // Max-heap holding the k best (distance, position) pairs seen so far.
        let mut heap: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(k + 1);
        for (position, entry) in self.entries.iter().enumerate() {
            let candidate = (
                OrderedFloat(squared_l2_distance(query, &entry.embedding)?),
                position,
            );
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|(squared, position)| Neighbor {
                id: self.entries[position].id,
                distance: squared.0.sqrt(),
            })
            .collect())
    }

    /// Serialize the index to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            entries: &self.entries,
        })?)
    }

    /// Load index from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EmbeddingError::InvalidResponse(format!(
                "unsupported index snapshot version {}",
                snapshot.version
            )));
        }

        let mut index = Self::new(snapshot.dimension);
        for entry in snapshot.entries {
            index.add(entry.id, entry.embedding)?;
        }

        info!("Loaded {} entries into vector index", index.len());
        Ok(index)
    }

    /// Load a snapshot from disk, or start empty if there is none yet.
    pub fn load(path: &Path, default_dimension: usize) -> Result<Self> {
        if !path.exists() {
            debug!(
                "No index snapshot at {}, starting empty ({default_dimension} dims)",
                path.display()
            );
            return Ok(Self::new(default_dimension));
        }

        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write a snapshot to disk.
    ///
    /// The snapshot goes to a temp file that is then renamed over `path`, so
    /// readers see either the old or the new snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, self.to_json()?)?;
        fs::rename(&temp_path, path)?;

        debug!("Saved {} index entries to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(3);
        index.add(10, vec![1.0, 0.0, 0.0]).unwrap();
        index.add(11, vec![0.0, 1.0, 0.0]).unwrap();
        index.add(12, vec![0.7, 0.7, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_index_add_and_get() {
        let mut index = FlatIndex::new(3);
        index.add(1, vec![1.0, 0.0, 0.0]).unwrap();

        assert!(index.contains(1));
        assert!(!index.contains(2));
        assert_eq!(index.get(1).map(|e| e.embedding.clone()), Some(vec![1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_index_search_exact_match_first() {
        let index = sample_index();

        for (id, vector) in [(10, [1.0, 0.0, 0.0]), (11, [0.0, 1.0, 0.0])] {
            let results = index.search(&vector, 3).unwrap();
            assert_eq!(results[0].id, id);
            assert_eq!(results[0].distance, 0.0);
            assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn test_search_returns_all_when_k_exceeds_size() {
        let index = sample_index();
        let results = index.search(&[1.0, 0.0, 0.0], 50).unwrap();
        let ids: Vec<VectorId> = results.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![10, 12, 11]);
    }

    #[test]
    fn test_search_empty_index() {
        let index = FlatIndex::new(3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_ties_follow_insertion_order() {
        let mut index = FlatIndex::new(2);
        index.add(7, vec![0.0, 1.0]).unwrap();
        index.add(3, vec![1.0, 0.0]).unwrap();
        index.add(5, vec![0.0, -1.0]).unwrap();

        // All three are at distance 1 from the origin.
        let ids: Vec<VectorId> = index
            .search(&[0.0, 0.0], 2)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![7, 3]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        let result = index.add(1, vec![1.0, 0.0]);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut index = sample_index();
        let result = index.add(11, vec![0.0, 0.0, 1.0]);
        assert!(matches!(result, Err(EmbeddingError::DuplicateId(11))));
        assert_eq!(index.get(11).map(|e| e.embedding.clone()), Some(vec![0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_remove_keeps_order_and_positions() {
        let mut index = sample_index();
        assert!(index.remove(10).is_some());
        assert!(index.remove(10).is_none());
        assert_eq!(index.ids().collect::<Vec<_>>(), vec![11, 12]);
        assert_eq!(index.get(12).map(|e| e.id), Some(12));

        assert_eq!(index.remove_many(&[12, 99]), 1);
        assert_eq!(index.ids().collect::<Vec<_>>(), vec![11]);
        index.add(12, vec![0.0, 0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("vector_index.json");
        let index = sample_index();
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path, 999).unwrap();
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.ids().collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(loaded.get(12), index.get(12));
    }

    #[test]
    fn test_load_missing_snapshot_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let index = FlatIndex::load(&temp_dir.path().join("absent.json"), 384).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 384);
    }

    #[test]
    fn test_snapshot_with_duplicate_ids_is_rejected() {
        let json = r#"{"version":1,"dimension":1,"entries":[{"id":1,"embedding":[0.0]},{"id":1,"embedding":[1.0]}]}"#;
        assert!(matches!(
            FlatIndex::from_json(json),
            Err(EmbeddingError::DuplicateId(1))
        ));
    }
}
