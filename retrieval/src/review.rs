//! Citation review payload.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use maid_chunk_store::ChunkId;

use crate::config::QueryConfig;
use crate::error::{Result, RetrievalError};
use crate::session::QueryHit;

/// Upper bound on hits per entry.
pub const MAX_HITS_PER_ENTRY: usize = 20;

/// Upper bound on snippet length, in characters.
pub const SNIPPET_CHARS: usize = 600;

/// Appended to truncated snippets.
pub const TRUNCATION_MARKER: &str = "…";

const ENTRIES_FILE: &str = "entries.json";

/// Page that renders `entries.json` in a browser.
pub const INDEX_FILE: &str = "index.html";

/// Static viewer files written next to the payload.
const VIEWER_FILES: &[(&str, &str)] = &[
    (INDEX_FILE, include_str!("templates/index.html")),
    ("review.js", include_str!("templates/review.js")),
    ("style.css", include_str!("templates/style.css")),
];

/// How much of each result list ends up in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewLimits {
    pub max_hits: usize,
    pub snippet_chars: usize,
}

impl ReviewLimits {
    /// Limits from configuration, capped at the payload maximums.
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            max_hits: config.max_hits_per_entry.min(MAX_HITS_PER_ENTRY),
            snippet_chars: config.snippet_chars.min(SNIPPET_CHARS),
        }
    }
}

impl Default for ReviewLimits {
    fn default() -> Self {
        Self {
            max_hits: MAX_HITS_PER_ENTRY,
            snippet_chars: SNIPPET_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub project: String,
    pub target: String,
    pub entries: Vec<ReviewEntry>,
}

/// One chunk of the target document and the passages it matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// 1-based position of the chunk in the target.
    pub index: usize,
    pub text: String,
    pub hits: Vec<ReviewHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewHit {
    pub meta: HitMeta,
    pub snippet: String,
    pub distance: f32,
    pub id: ChunkId,
}

/// Where a hit can be cited from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitMeta {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ReviewPayload {
    /// Pair each query text with its hits.
    ///
    /// `queries` and `results` must have the same length.
    pub fn build(
        project: &str,
        target: &str,
        queries: &[String],
        results: &[Vec<QueryHit>],
        limits: ReviewLimits,
    ) -> Result<Self> {
        if queries.len() != results.len() {
            return Err(RetrievalError::Validation(format!(
                "{} query texts but {} result lists",
                queries.len(),
                results.len()
            )));
        }

        let max_hits = limits.max_hits.min(MAX_HITS_PER_ENTRY);
        let snippet_chars = limits.snippet_chars.min(SNIPPET_CHARS);

        let entries = queries
            .iter()
            .zip(results)
            .enumerate()
            .map(|(i, (text, hits))| ReviewEntry {
                index: i + 1,
                text: text.clone(),
                hits: hits
                    .iter()
                    .take(max_hits)
                    .map(|hit| ReviewHit {
                        meta: HitMeta {
                            file_path: hit.metadata.source_path.clone(),
                            page: hit.metadata.page,
                        },
                        snippet: truncate_snippet(&hit.text, snippet_chars),
                        distance: hit.distance,
                        id: hit.id,
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            project: project.to_string(),
            target: target.to_string(),
            entries,
        })
    }

    /// Default output directory: `<target stem>_citation_review` beside the target.
    pub fn default_output_dir(target: &Path) -> PathBuf {
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".to_string());
        target.with_file_name(format!("{stem}_citation_review"))
    }

    /// Write a self-contained review folder into `dir`.
    ///
    /// The folder holds `entries.json` and a static viewer for it. Existing
    /// viewer files are replaced. Returns the path of `index.html`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(ENTRIES_FILE), serde_json::to_string_pretty(self)?)?;
        for (name, content) in VIEWER_FILES {
            fs::write(dir.join(name), content)?;
        }

        let index = dir.join(INDEX_FILE);
        info!(
            "Wrote review of {} entries to {}",
            self.entries.len(),
            index.display()
        );
        Ok(index)
    }

    /// Read the payload of a review folder written by [`ReviewPayload::write`].
    pub fn read(dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(dir.join(ENTRIES_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}{TRUNCATION_MARKER}", &text[..end]),
        None => text.to_string(),
    }
}
