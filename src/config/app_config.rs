use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::retrieval::{RetrievalPreset, RetrievalSettings};
use crate::domain::semantic_cache::{validate_threshold, CacheSettings};
use crate::domain::vector_index::VectorBackend;
use crate::domain::DomainError;
use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Document vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub dimension: usize,
    /// Texts embedded per provider call during ingest
    pub batch_size: usize,
    pub search_k: usize,
    pub data_dir: PathBuf,
    pub index_file: String,
    pub meta_file: String,
    /// Persisted versions kept by `cleanup_old_versions`
    pub keep_versions: usize,
    /// Falls back to `DATABASE_URL`
    pub pg_dsn: Option<String>,
    pub pg_table: String,
    /// Candidate multiplier for filtered searches
    pub filter_widening: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Flat,
            dimension: 384,
            batch_size: 100,
            search_k: 10,
            data_dir: PathBuf::from("./data"),
            index_file: "vectors.index".to_string(),
            meta_file: "vectors_meta.json".to_string(),
            keep_versions: 3,
            pg_dsn: None,
            pg_table: "rag_vectors".to_string(),
            filter_widening: 4,
        }
    }
}

impl VectorStoreConfig {
    /// Configured DSN, or `DATABASE_URL` from the environment
    pub fn resolve_dsn(&self) -> Option<String> {
        self.pg_dsn
            .clone()
            .filter(|dsn| !dsn.trim().is_empty())
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

/// Semantic cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub cache_dir: PathBuf,
    pub max_cache_size: usize,
    pub default_ttl_hours: u32,
    pub similarity_threshold: f32,
    pub candidate_pool: usize,
    /// Interval of the background expiry sweep
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let settings = CacheSettings::default();

        Self {
            enabled: true,
            cache_dir: PathBuf::from("./cache"),
            max_cache_size: settings.max_cache_size,
            default_ttl_hours: settings.default_ttl_hours,
            similarity_threshold: settings.similarity_threshold,
            candidate_pool: settings.candidate_pool,
            cleanup_interval_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            max_cache_size: self.max_cache_size,
            default_ttl_hours: self.default_ttl_hours,
            similarity_threshold: self.similarity_threshold,
            candidate_pool: self.candidate_pool,
        }
    }
}

/// Token counter used for chunk sizing and budgets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenCounterType {
    #[default]
    Heuristic,
    /// cl100k_base BPE, needs the `tiktoken` feature
    Tiktoken,
}

/// Retrieval pipeline configuration
///
/// A preset, when given, replaces the individual settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub preset: Option<RetrievalPreset>,
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub token_counter: TokenCounterType,
    #[serde(flatten)]
    pub settings: RetrievalSettings,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            preset: None,
            read_timeout_secs: default_timeout_secs(),
            token_counter: TokenCounterType::default(),
            settings: RetrievalSettings::default(),
        }
    }
}

impl RetrievalConfig {
    /// Settings after applying the preset
    pub fn effective_settings(&self) -> RetrievalSettings {
        match self.preset {
            Some(preset) => preset.settings(),
            None => self.settings.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Offline feature-hashing embeddings
    #[default]
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint
    OpenAi,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderType,
    pub model: String,
    pub dimensions: usize,
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Query embeddings kept in memory; 0 disables the cache
    pub cache_capacity: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Hashing,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: 1024,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject configurations the engine cannot be built from
    pub fn validate(&self) -> Result<(), DomainError> {
        let store = &self.vector_store;

        if store.dimension == 0 {
            return Err(DomainError::configuration(
                "vector_store.dimension must be greater than 0",
            ));
        }

        if store.batch_size == 0 {
            return Err(DomainError::configuration(
                "vector_store.batch_size must be greater than 0",
            ));
        }

        if store.backend == VectorBackend::Pgvector && store.resolve_dsn().is_none() {
            return Err(DomainError::configuration(
                "pgvector backend requires vector_store.pg_dsn or DATABASE_URL",
            ));
        }

        if self.embedding.dimensions != store.dimension {
            return Err(DomainError::configuration(format!(
                "embedding.dimensions ({}) must equal vector_store.dimension ({})",
                self.embedding.dimensions, store.dimension
            )));
        }

        validate_threshold(self.cache.similarity_threshold)?;
        self.cache.settings().validate()?;

        if self.cache.cleanup_interval_secs == 0 {
            return Err(DomainError::configuration(
                "cache.cleanup_interval_secs must be greater than 0",
            ));
        }

        self.retrieval.effective_settings().validate()?;

        Ok(())
    }
}
