//! Resident vector index per project.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use maid_chunk_store::{ChunkId, ChunkMetadata};
use maid_embeddings::FlatIndex;

use crate::error::{Result, RetrievalError};
use crate::project::Project;

/// One record of the side metadata file.
///
/// The chunk store stays the source of truth for metadata; this file only
/// mirrors it for readers that do not open the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEntry {
    pub id: ChunkId,
    pub metadata: ChunkMetadata,
}

/// The index and side metadata of the project currently resident.
#[derive(Debug)]
pub struct ResidentIndex {
    project: Project,

    /// The vector index.
    pub index: FlatIndex,

    /// Side metadata in insertion order.
    pub side_metadata: Vec<SideEntry>,
}

impl ResidentIndex {
    fn load(project: &Project, default_dimension: usize) -> Result<Self> {
        let index = FlatIndex::load(&project.index_path(), default_dimension)?;
        let side_metadata = read_side_metadata(&project.side_metadata_path())?;
        info!(
            "Loaded index for project '{}' ({} entries, {} dims)",
            project.name(),
            index.len(),
            index.dimension()
        );

        Ok(Self {
            project: project.clone(),
            index,
            side_metadata,
        })
    }

    /// Project this index belongs to.
    pub fn project(&self) -> &Project {
        &self.project
    }
}

fn read_side_metadata(path: &Path) -> Result<Vec<SideEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Keeps at most one project's vector index in memory.
///
/// Asking for the resident index of the same project again returns it
/// unchanged. Asking for a different project evicts the current one, so
/// anything not yet flushed is dropped.
#[derive(Debug)]
pub struct IndexManager {
    /// Dimension of indexes created for projects without a snapshot.
    default_dimension: usize,

    /// Whether flushes also write the side metadata file.
    write_side_metadata: bool,

    resident: Option<ResidentIndex>,
}

impl IndexManager {
    pub fn new(default_dimension: usize) -> Self {
        Self {
            default_dimension,
            write_side_metadata: true,
            resident: None,
        }
    }

    /// Enable or disable writing the side metadata file.
    pub fn with_side_metadata(mut self, enabled: bool) -> Self {
        self.write_side_metadata = enabled;
        self
    }

    /// Get the resident index for `project`, loading it if needed.
    pub fn resident(&mut self, project: &Project) -> Result<&mut ResidentIndex> {
        let resident = match self.resident.take() {
            Some(current) if current.project == *project => current,
            previous => {
                if let Some(previous) = previous {
                    info!(
                        "Evicting index for project '{}' to load '{}'",
                        previous.project.name(),
                        project.name()
                    );
                }
                ResidentIndex::load(project, self.default_dimension)?
            }
        };
        Ok(self.resident.insert(resident))
    }

    /// The resident index, if it belongs to `project`.
    pub fn get(&self, project: &Project) -> Option<&ResidentIndex> {
        self.resident.as_ref().filter(|r| r.project == *project)
    }

    /// Project whose index is currently resident.
    pub fn resident_project(&self) -> Option<&Project> {
        self.resident.as_ref().map(|r| &r.project)
    }

    /// Write the resident index of `project` to disk.
    ///
    /// Only call after the matching chunk store commit. The index snapshot and
    /// the side metadata are replaced one after the other, not together.
    pub fn flush(&self, project: &Project) -> Result<()> {
        let resident = self.get(project).ok_or_else(|| {
            RetrievalError::Validation(format!(
                "index for project '{}' is not resident",
                project.name()
            ))
        })?;

        resident.index.save(&project.index_path())?;
        if self.write_side_metadata {
            let path = project.side_metadata_path();
            let temp_path = path.with_extension("json.tmp");
            fs::write(&temp_path, serde_json::to_string(&resident.side_metadata)?)?;
            fs::rename(&temp_path, &path)?;
        }

        debug!(
            "Flushed index for project '{}' ({} entries)",
            project.name(),
            resident.index.len()
        );
        Ok(())
    }

    /// Drop the resident index without writing it.
    pub fn evict(&mut self) {
        if let Some(previous) = self.resident.take() {
            debug!("Evicted index for project '{}'", previous.project.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Projects;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Project, Project) {
        let temp_dir = TempDir::new().unwrap();
        let projects = Projects::new(temp_dir.path());
        let a = projects.create("a").unwrap();
        let b = projects.create("b").unwrap();
        (temp_dir, a, b)
    }

    #[test]
    fn test_missing_snapshot_gives_empty_index() {
        let (_temp_dir, a, _b) = setup();
        let mut manager = IndexManager::new(4);

        let resident = manager.resident(&a).unwrap();
        assert!(resident.index.is_empty());
        assert_eq!(resident.index.dimension(), 4);
        assert!(resident.side_metadata.is_empty());
    }

    #[test]
    fn test_same_project_stays_resident() {
        let (_temp_dir, a, _b) = setup();
        let mut manager = IndexManager::new(2);

        manager.resident(&a).unwrap().index.add(1, vec![1.0, 0.0]).unwrap();

        // Not flushed, so a reload would have lost the entry.
        let resident = manager.resident(&a).unwrap();
        assert_eq!(resident.index.len(), 1);
        assert_eq!(manager.resident_project(), Some(&a));
    }

    #[test]
    fn test_switching_project_evicts_unflushed_state() {
        let (_temp_dir, a, b) = setup();
        let mut manager = IndexManager::new(2);

        manager.resident(&a).unwrap().index.add(1, vec![1.0, 0.0]).unwrap();
        assert!(manager.resident(&b).unwrap().index.is_empty());
        assert!(manager.get(&a).is_none());

        assert!(manager.resident(&a).unwrap().index.is_empty());
    }

    #[test]
    fn test_flush_then_reload() {
        let (_temp_dir, a, b) = setup();
        let mut manager = IndexManager::new(2);

        let resident = manager.resident(&a).unwrap();
        resident.index.add(7, vec![0.0, 1.0]).unwrap();
        resident.side_metadata.push(SideEntry {
            id: 7,
            metadata: ChunkMetadata::new("a.pdf").with_page(1),
        });
        manager.flush(&a).unwrap();
        assert!(a.index_path().is_file());
        assert!(a.side_metadata_path().is_file());

        manager.resident(&b).unwrap();
        let reloaded = manager.resident(&a).unwrap();
        assert_eq!(reloaded.index.ids().collect::<Vec<_>>(), vec![7]);
        assert_eq!(reloaded.side_metadata[0].metadata.page, Some(1));
    }

    #[test]
    fn test_flush_requires_resident_project() {
        let (_temp_dir, a, b) = setup();
        let mut manager = IndexManager::new(2).with_side_metadata(false);
        manager.resident(&a).unwrap();

        assert!(matches!(
            manager.flush(&b),
            Err(RetrievalError::Validation(_))
        ));

        manager.flush(&a).unwrap();
        assert!(!a.side_metadata_path().exists());

        manager.evict();
        assert!(manager.resident_project().is_none());
    }
}
