//! Configuration for the retrieval pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use maid_embeddings::{EmbeddingProvider, HashingProvider, OpenAIProvider};

use crate::error::{Result, RetrievalError};
use crate::project::DuplicatePolicy;

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "RESEARCH_MAID_CONFIG";

/// Environment variable overriding the projects directory.
pub const HOME_ENV: &str = "RESEARCH_MAID_HOME";

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory holding one subdirectory per project.
    pub projects_dir: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Query configuration.
    pub query: QueryConfig,

    /// Ingest configuration.
    pub ingest: IngestConfig,

    /// Document splitting configuration.
    pub splitter: SplitterConfig,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
            ingest: IngestConfig::default(),
            splitter: SplitterConfig::default(),
        }
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Set the ingest configuration.
    pub fn with_ingest(mut self, config: IngestConfig) -> Self {
        self.ingest = config;
        self
    }

    /// Set the splitter configuration.
    pub fn with_splitter(mut self, config: SplitterConfig) -> Self {
        self.splitter = config;
        self
    }

    /// Read a TOML config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Find and load the configuration for this process.
    ///
    /// Looks at `$RESEARCH_MAID_CONFIG`, then `<config_dir>/research-maid/config.toml`,
    /// then falls back to defaults. `$RESEARCH_MAID_HOME` overrides the
    /// projects directory in every case.
    pub fn discover() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path))?,
            None => match Self::default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        if let Some(home) = std::env::var_os(HOME_ENV) {
            config.projects_dir = PathBuf::from(home);
        }
        Ok(config)
    }

    /// Per-user config file location.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("research-maid").join("config.toml"))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.query.top_k == 0 {
            return Err(RetrievalError::Config("query.top_k must be at least 1".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(RetrievalError::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RetrievalError::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            return Err(RetrievalError::Config(format!(
                "splitter.chunk_overlap ({}) must be smaller than splitter.chunk_size ({})",
                self.splitter.chunk_overlap, self.splitter.chunk_size
            )));
        }
        if let Some(max_distance) = self.query.max_distance
            && (max_distance.is_nan() || max_distance < 0.0)
        {
            return Err(RetrievalError::Config(
                "query.max_distance must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(
            dirs::data_dir()
                .unwrap_or_default()
                .join("research-maid/projects"),
        )
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings. Provider default when unset.
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,

    /// Vector length, shared by the provider and the index.
    pub dimension: usize,

    /// Texts per provider call.
    pub batch_size: usize,
}

impl EmbeddingConfig {
    /// Construct the configured provider.
    pub fn build_provider(&self) -> Result<Box<dyn EmbeddingProvider>> {
        let provider: Box<dyn EmbeddingProvider> = match self.provider {
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new().with_dimensions(self.dimension);
                if let Some(model) = &self.model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(base_url) = &self.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                if !provider.is_available() {
                    return Err(RetrievalError::Config(
                        "OPENAI_API_KEY is not set; set it or use provider = \"hashing\""
                            .to_string(),
                    ));
                }
                Box::new(provider)
            }
            EmbeddingProviderType::Hashing => Box::new(HashingProvider::new(self.dimension)),
        };

        info!(
            "Using embedding provider {} ({}, {} dimensions)",
            provider.name(),
            provider.model(),
            provider.dimension()
        );
        Ok(provider)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: None,
            base_url: None,
            dimension: maid_embeddings::DEFAULT_DIMENSION,
            batch_size: 64,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline feature hashing.
    #[serde(rename = "hashing")]
    Hashing,
}

/// Configuration for citation queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Neighbours fetched per query chunk.
    pub top_k: usize,

    /// Drop hits farther than this L2 distance.
    pub max_distance: Option<f32>,

    /// Hits kept per review entry.
    pub max_hits_per_entry: usize,

    /// Characters kept per review snippet.
    pub snippet_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_distance: None,
            max_hits_per_entry: crate::review::MAX_HITS_PER_ENTRY,
            snippet_chars: crate::review::SNIPPET_CHARS,
        }
    }
}

/// Configuration for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// What to do when an added document's name is taken.
    pub on_duplicate: DuplicatePolicy,

    /// Keep the side metadata file next to the index snapshot.
    pub write_side_metadata: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            on_duplicate: DuplicatePolicy::Error,
            write_side_metadata: true,
        }
    }
}

/// Configuration for document splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RetrievalConfig = toml::from_str(
            r#"
            projects_dir = "/tmp/maid"

            [embedding]
            provider = "hashing"
            dimension = 64

            [query]
            top_k = 3
            max_distance = 1.2

            [ingest]
            on_duplicate = "rename"
            "#,
        )
        .unwrap();

        assert_eq!(config.projects_dir, PathBuf::from("/tmp/maid"));
        assert_eq!(config.embedding.provider, EmbeddingProviderType::Hashing);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.query.top_k, 3);
        assert_eq!(config.query.max_distance, Some(1.2));
        assert_eq!(config.query.max_hits_per_entry, 20);
        assert_eq!(config.ingest.on_duplicate, DuplicatePolicy::Rename);
        assert!(config.ingest.write_side_metadata);
        assert_eq!(config.splitter, SplitterConfig::default());
    }

    #[test]
    fn test_defaults() {
        let config = RetrievalConfig::new("/tmp/maid");
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(config.ingest.on_duplicate, DuplicatePolicy::Error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RetrievalConfig::new("/tmp/maid");
        config.query.top_k = 0;
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let config = RetrievalConfig::new("/tmp/maid").with_splitter(SplitterConfig {
            chunk_size: 20,
            chunk_overlap: 20,
        });
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let mut config = RetrievalConfig::new("/tmp/maid");
        config.query.max_distance = Some(-1.0);
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[splitter]\nchunk_size = 100\nchunk_overlap = 10\n").unwrap();

        let config = RetrievalConfig::load(&path).unwrap();
        assert_eq!(config.splitter.chunk_size, 100);
        assert_eq!(config.splitter.chunk_overlap, 10);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[embedding]\nprovider = \"word2vec\"\n").unwrap();
        assert!(matches!(
            RetrievalConfig::load(&path),
            Err(RetrievalError::Config(_))
        ));

        assert!(matches!(
            RetrievalConfig::load(temp_dir.path().join("missing.toml")),
            Err(RetrievalError::Config(_))
        ));
    }

    #[test]
    fn test_hashing_provider_built_from_config() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Hashing,
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let provider = config.build_provider().unwrap();
        assert_eq!(provider.name(), "hashing");
        assert_eq!(provider.dimension(), 32);
    }
}
