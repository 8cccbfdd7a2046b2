//! Ingest and query pipeline.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use maid_chunk_store::{Chunk, ChunkId, ChunkMetadata, ChunkStore};
use maid_embeddings::{Embedding, EmbeddingError, EmbeddingProvider, FlatIndex};

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::persistence::{IndexManager, SideEntry};
use crate::project::Project;

/// A chunk returned by a query, with its distance to the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,

    /// L2 distance between query and chunk embeddings. 0 is an exact match.
    pub distance: f32,
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Issued ids, in input order.
    pub ids: Vec<ChunkId>,
}

impl IngestReport {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Comparison of a project's vector index against its chunk store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Entries in the vector index.
    pub index_size: usize,

    /// Rows in the chunk store.
    pub row_count: usize,

    /// Indexed ids with no chunk row.
    pub missing_rows: Vec<ChunkId>,

    /// Chunk rows with no index entry.
    pub unindexed_rows: Vec<ChunkId>,
}

impl ConsistencyReport {
    /// Every id appears in both structures.
    pub fn is_consistent(&self) -> bool {
        self.missing_rows.is_empty() && self.unindexed_rows.is_empty()
    }
}

struct OpenStore {
    project: Project,
    store: ChunkStore,
}

/// Owns the open chunk store and resident vector index of one project.
///
/// At most one project is open at a time. Using a session with a different
/// project closes the current store and evicts the current index first.
/// Sessions are independent of each other; two sessions must not write the
/// same project.
pub struct Session {
    /// Configuration.
    config: RetrievalConfig,

    /// Embedding provider.
    provider: Box<dyn EmbeddingProvider>,

    /// Chunk store of the open project.
    store: Option<OpenStore>,

    /// Resident vector index.
    indexes: IndexManager,
}

impl Session {
    /// Create a session with an explicit provider.
    pub fn new(config: RetrievalConfig, provider: Box<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        let indexes = IndexManager::new(provider.dimension())
            .with_side_metadata(config.ingest.write_side_metadata);

        Ok(Self {
            config,
            provider,
            store: None,
            indexes,
        })
    }

    /// Create a session with the provider named in the configuration.
    pub fn from_config(config: RetrievalConfig) -> Result<Self> {
        let provider = config.embedding.build_provider()?;
        Self::new(config, provider)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Project currently open in this session.
    pub fn open_project(&self) -> Option<&Project> {
        self.store.as_ref().map(|open| &open.project)
    }

    /// Open the chunk store and resident index of `project`.
    pub fn open(&mut self, project: &Project) -> Result<()> {
        open_store(&mut self.store, project)?;
        self.indexes.resident(project)?;
        Ok(())
    }

    /// Close the open project, dropping anything uncommitted.
    pub fn close(&mut self) {
        if let Some(open) = self.store.take() {
            debug!(
                "Closed chunk store for project '{}' at {}",
                open.project.name(),
                open.store.path().display()
            );
        }
        self.indexes.evict();
    }

    /// Embed, store and index `chunks` as one unit.
    ///
    /// Either every chunk is committed and indexed, or the chunk store and the
    /// resident index are left exactly as they were.
    pub fn ingest(&mut self, project: &Project, chunks: &[Chunk]) -> Result<IngestReport> {
        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.text.trim().is_empty() {
                return Err(RetrievalError::Validation(format!(
                    "chunk {position} has empty text"
                )));
            }
            if chunk.metadata.source_path.trim().is_empty() {
                return Err(RetrievalError::Validation(format!(
                    "chunk {position} has no source path"
                )));
            }
        }

        let store = open_store(&mut self.store, project)?;
        let resident = self.indexes.resident(project)?;
        if chunks.is_empty() {
            return Ok(IngestReport::default());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut added = Vec::with_capacity(chunks.len());
        let written = embed_all(
            self.provider.as_ref(),
            &texts,
            self.config.embedding.batch_size,
        )
        .and_then(|vectors| {
            write_all(store, &mut resident.index, chunks, vectors, &mut added)?;
            store.commit()?;
            Ok(())
        });

        if let Err(err) = written {
            warn!(
                "Ingest of {} chunks into project '{}' failed, rolling back: {err}",
                chunks.len(),
                project.name()
            );
            if let Err(rollback_err) = store.rollback() {
                warn!("Rollback failed: {rollback_err}");
            }
            resident.index.remove_many(&added);
            return Err(err);
        }

        resident
            .side_metadata
            .extend(added.iter().zip(chunks).map(|(&id, chunk)| SideEntry {
                id,
                metadata: chunk.metadata.clone(),
            }));
        self.indexes.flush(project)?;

        if let (Some(first), Some(last)) = (added.first(), added.last()) {
            info!(
                "Ingested {} chunks into project '{}' (ids {first}..={last})",
                added.len(),
                project.name()
            );
        }
        Ok(IngestReport { ids: added })
    }

    /// Find the `k` nearest chunks for each query text.
    ///
    /// Returns one hit list per query, in input order, each sorted by
    /// ascending distance. Hits farther than `query.max_distance` are
    /// dropped.
    pub fn query(
        &mut self,
        project: &Project,
        texts: &[String],
        k: usize,
    ) -> Result<Vec<Vec<QueryHit>>> {
        let store = open_store(&mut self.store, project)?;
        let resident = self.indexes.resident(project)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if resident.index.is_empty() {
            debug!("Index for project '{}' is empty", project.name());
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let vectors = embed_all(
            self.provider.as_ref(),
            texts,
            self.config.embedding.batch_size,
        )?;
        let max_distance = self.config.query.max_distance;

        let mut results = Vec::with_capacity(texts.len());
        for vector in &vectors {
            let mut hits = Vec::new();
            for neighbor in resident.index.search(vector, k)? {
                // Resolve before filtering so a dangling id always fails.
                let stored = store.get(neighbor.id)?;
                if max_distance.is_some_and(|max| neighbor.distance > max) {
                    continue;
                }
                hits.push(QueryHit {
                    id: stored.id,
                    text: stored.text,
                    metadata: stored.metadata,
                    distance: neighbor.distance,
                });
            }
            results.push(hits);
        }

        debug!(
            "Answered {} queries against project '{}' (k = {k})",
            texts.len(),
            project.name()
        );
        Ok(results)
    }

    /// Compare the resident index of `project` with its chunk store.
    pub fn check(&mut self, project: &Project) -> Result<ConsistencyReport> {
        let store = open_store(&mut self.store, project)?;
        let resident = self.indexes.resident(project)?;

        let row_ids = store.ids()?;
        let missing_rows = resident
            .index
            .ids()
            .filter(|id| row_ids.binary_search(id).is_err())
            .collect();
        let unindexed_rows = row_ids
            .iter()
            .copied()
            .filter(|&id| !resident.index.contains(id))
            .collect();

        Ok(ConsistencyReport {
            index_size: resident.index.len(),
            row_count: row_ids.len(),
            missing_rows,
            unindexed_rows,
        })
    }
}

/// Open the store for `project`, closing one for another project first.
fn open_store<'a>(
    slot: &'a mut Option<OpenStore>,
    project: &Project,
) -> Result<&'a mut ChunkStore> {
    let open = match slot.take() {
        Some(current) if current.project == *project => current,
        previous => {
            if let Some(previous) = previous {
                info!(
                    "Closing chunk store for project '{}' to open '{}'",
                    previous.project.name(),
                    project.name()
                );
            }
            OpenStore {
                project: project.clone(),
                store: ChunkStore::open(project.chunk_store_path())?,
            }
        }
    };
    Ok(&mut slot.insert(open).store)
}

fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Embedding>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = provider.embed_batch(batch)?;
        if embedded.len() != batch.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "provider {} returned {} embeddings for {} texts",
                provider.name(),
                embedded.len(),
                batch.len()
            ))
            .into());
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

/// Insert each chunk and index it under the issued id.
///
/// `added` collects ids that made it into the index, so a failure can remove
/// exactly those.
fn write_all(
    store: &mut ChunkStore,
    index: &mut FlatIndex,
    chunks: &[Chunk],
    vectors: Vec<Embedding>,
    added: &mut Vec<ChunkId>,
) -> Result<()> {
    for (chunk, vector) in chunks.iter().zip(vectors) {
        let id = store.insert(&chunk.text, &chunk.metadata)?;
        index.add(id, vector)?;
        added.push(id);
    }
    Ok(())
}
