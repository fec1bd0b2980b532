//! PMP RAG Engine
//!
//! Semantic retrieval and cache engine with support for:
//! - Pluggable vector indexes (flat file-backed, pgvector)
//! - A similarity-aware query cache with TTL, LRU eviction and persistence
//! - Retrieval post-processing (dedup, BM25 rerank, chunking, token budgets)
//! - Cache administration and background maintenance

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use domain::embedding::EmbeddingProvider;
use domain::semantic_cache::SystemClock;
use domain::vector_index::VectorIndex;
use domain::DomainError;
use infrastructure::embedding::EmbeddingProviderFactory;
use infrastructure::retrieval::{RetrievalPostProcessor, TokenEstimatorFactory};
use infrastructure::semantic_cache::{SemanticCache, CACHE_FILE};
use infrastructure::services::{CacheAdmin, MaintenanceTask, RetrievalOptions, RetrievalService};
use infrastructure::vector_index::VectorIndexFactory;

/// Engine context: every component built once and shared for the process lifetime
#[derive(Debug)]
pub struct RagEngine {
    config: AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<SemanticCache>,
    retrieval: Arc<RetrievalService>,
    admin: CacheAdmin,
    maintenance: Mutex<Option<MaintenanceTask>>,
}

impl RagEngine {
    /// Build all components from configuration
    pub async fn build(config: &AppConfig) -> Result<Self, DomainError> {
        config.validate()?;

        let embedder = EmbeddingProviderFactory::create(&config.embedding)?;
        let index = VectorIndexFactory::create(&config.vector_store).await?;

        let cache_dir = &config.cache.cache_dir;
        tokio::fs::create_dir_all(cache_dir).await?;

        let query_index =
            VectorIndexFactory::create_query_index(cache_dir, config.vector_store.dimension)
                .await?;

        let cache = Arc::new(
            SemanticCache::open(
                embedder.clone(),
                query_index,
                config.cache.settings(),
                cache_dir.join(CACHE_FILE),
                Arc::new(SystemClock),
            )
            .await?,
        );

        let estimator = TokenEstimatorFactory::create(config.retrieval.token_counter);
        let processor =
            RetrievalPostProcessor::new(config.retrieval.effective_settings(), estimator)?;

        let retrieval = Arc::new(RetrievalService::new(
            index.clone(),
            embedder.clone(),
            config.cache.enabled.then(|| cache.clone()),
            processor,
            RetrievalOptions {
                batch_size: config.vector_store.batch_size,
                fetch_timeout: Duration::from_secs(config.retrieval.read_timeout_secs),
                cache_ttl_hours: None,
            },
        )?);

        let admin = CacheAdmin::new(cache.clone(), config.vector_store.keep_versions);

        info!(
            backend = index.backend().as_str(),
            dimension = index.dimension(),
            embedding_provider = embedder.provider_name(),
            embedding_model = embedder.model(),
            cache_enabled = config.cache.enabled,
            cached_entries = cache.len().await,
            "RAG engine initialized"
        );

        Ok(Self {
            config: config.clone(),
            embedder,
            index,
            cache,
            retrieval,
            admin,
            maintenance: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    pub fn admin(&self) -> &CacheAdmin {
        &self.admin
    }

    /// Start the periodic expiry sweep and compaction; a no-op when already running
    pub async fn start_maintenance(&self) {
        let mut slot = self.maintenance.lock().await;

        if slot.is_some() {
            warn!("Cache maintenance already running");
            return;
        }

        let interval = Duration::from_secs(self.config.cache.cleanup_interval_secs);
        *slot = Some(MaintenanceTask::spawn(
            self.cache.clone(),
            interval,
            self.config.vector_store.keep_versions,
        ));
    }

    /// Stop maintenance and flush the cache snapshot
    pub async fn shutdown(&self) -> Result<(), DomainError> {
        if let Some(task) = self.maintenance.lock().await.take() {
            task.stop().await;
        }

        self.cache.flush().await?;
        info!("RAG engine shut down");

        Ok(())
    }
}
