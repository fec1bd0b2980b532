//! Retrieval service
//!
//! Runs the full query path: cache lookup, external fetch, ingestion into the
//! document index, vector search, post-processing and cache write-back.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::retrieval::{Chunk, DocumentFetcher, RetrievedDocument, SourceDocument};
use crate::domain::vector_index::VectorIndex;
use crate::domain::DomainError;
use crate::infrastructure::logging::log_preview;
use crate::infrastructure::retrieval::{ProcessedContext, RetrievalPostProcessor};
use crate::infrastructure::semantic_cache::SemanticCache;

/// Knobs of the retrieval path that are not post-processing settings
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Texts embedded per provider call during ingestion
    pub batch_size: usize,
    /// Upper bound on one external fetch
    pub fetch_timeout: Duration,
    /// TTL of cached contexts; `None` uses the cache default
    pub cache_ttl_hours: Option<u32>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            fetch_timeout: Duration::from_secs(30),
            cache_ttl_hours: None,
        }
    }
}

/// Context assembled for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub query: String,
    pub context: String,
    pub chunks: Vec<Chunk>,
    pub documents: Vec<RetrievedDocument>,
    pub total_tokens: usize,
    pub duplicates_removed: usize,
    /// True when served from the semantic cache
    pub cache_hit: bool,
}

impl RetrievalOutcome {
    fn from_processed(query: &str, processed: ProcessedContext, cache_hit: bool) -> Self {
        Self {
            query: query.to_string(),
            context: processed.context,
            chunks: processed.chunks,
            documents: processed.documents,
            total_tokens: processed.total_tokens,
            duplicates_removed: processed.duplicates_removed,
            cache_hit,
        }
    }
}

/// Result of ingesting fetched documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub added: usize,
    /// Texts already present in the index
    pub skipped: usize,
    pub persisted: bool,
}

/// Query path over the document index and the semantic cache
#[derive(Debug)]
pub struct RetrievalService {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<SemanticCache>>,
    processor: RetrievalPostProcessor,
    options: RetrievalOptions,
    permits: Arc<Semaphore>,
}

impl RetrievalService {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Option<Arc<SemanticCache>>,
        processor: RetrievalPostProcessor,
        options: RetrievalOptions,
    ) -> Result<Self, DomainError> {
        if embedder.dimensions() != index.dimension() {
            return Err(DomainError::configuration(format!(
                "Embedding dimensions ({}) differ from document index dimension ({})",
                embedder.dimensions(),
                index.dimension()
            )));
        }

        if options.batch_size == 0 {
            return Err(DomainError::configuration(
                "Batch size must be greater than 0",
            ));
        }

        let permits = Arc::new(Semaphore::new(
            processor.settings().max_concurrent_retrievals.max(1),
        ));

        Ok(Self {
            index,
            embedder,
            cache,
            processor,
            options,
            permits,
        })
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn processor(&self) -> &RetrievalPostProcessor {
        &self.processor
    }

    /// Answer a query from the cache, or fetch, index, search and post-process
    pub async fn retrieve(
        &self,
        query: &str,
        fetcher: &dyn DocumentFetcher,
    ) -> Result<RetrievalOutcome, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("Query must not be empty"));
        }

        if let Some(outcome) = self.cached(query).await? {
            return Ok(outcome);
        }

        let documents = self.fetch(query, fetcher).await;
        if !documents.is_empty() {
            self.ingest(query, &documents).await?;
        }

        let hits = self.search(query).await?;
        let candidates: Vec<RetrievedDocument> = hits.into_iter().map(Into::into).collect();
        let processed = self.processor.process(query, candidates)?;

        info!(
            query = log_preview(query),
            fetched = documents.len(),
            documents = processed.documents.len(),
            chunks = processed.chunks.len(),
            tokens = processed.total_tokens,
            "Retrieved context"
        );

        self.store(query, &processed).await;

        Ok(RetrievalOutcome::from_processed(query, processed, false))
    }

    /// Retrieve several queries, at most `max_concurrent_retrievals` at a time
    pub async fn retrieve_many(
        &self,
        queries: &[String],
        fetcher: &dyn DocumentFetcher,
    ) -> Vec<Result<RetrievalOutcome, DomainError>> {
        let tasks = queries.iter().map(|query| async move {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| DomainError::internal(format!("Retrieval semaphore closed: {}", e)))?;

            self.retrieve(query, fetcher).await
        });

        join_all(tasks).await
    }

    /// Embed documents in batches and add them to the document index
    pub async fn ingest(
        &self,
        query: &str,
        documents: &[SourceDocument],
    ) -> Result<IngestReport, DomainError> {
        let mut report = IngestReport {
            documents: documents.len(),
            persisted: true,
            ..Default::default()
        };

        let usable: Vec<&SourceDocument> = documents
            .iter()
            .filter(|d| !d.text.trim().is_empty())
            .collect();

        for batch in usable.chunks(self.options.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();

            let vectors = self.embedder.encode(&texts).await.inspect_err(|e| {
                warn!(
                    provider = self.embedder.provider_name(),
                    batch = texts.len(),
                    error = %e,
                    "Failed to embed documents"
                )
            })?;

            let metas = batch.iter().map(|d| d.metadata(query)).collect();
            let outcome = self.index.add(vectors, texts, metas).await?;

            report.added += outcome.added;
            report.skipped += outcome.skipped;
            report.persisted &= outcome.persisted;
        }

        debug!(
            documents = report.documents,
            added = report.added,
            skipped = report.skipped,
            "Ingested documents"
        );

        Ok(report)
    }

    async fn cached(&self, query: &str) -> Result<Option<RetrievalOutcome>, DomainError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };

        let Some(hit) = cache.get(query, None).await? else {
            return Ok(None);
        };

        let decoded = hit
            .results
            .into_iter()
            .next()
            .map(serde_json::from_value::<ProcessedContext>);

        match decoded {
            Some(Ok(processed)) => Ok(Some(RetrievalOutcome::from_processed(
                query, processed, true,
            ))),
            Some(Err(e)) => {
                warn!(
                    query = log_preview(query),
                    error = %e,
                    "Cached context is unreadable, retrieving again"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Fetch failures and timeouts fall back to the documents already indexed
    async fn fetch(&self, query: &str, fetcher: &dyn DocumentFetcher) -> Vec<SourceDocument> {
        match tokio::time::timeout(self.options.fetch_timeout, fetcher.fetch(query)).await {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                warn!(query = log_preview(query), error = %e, "Document fetch failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    query = log_preview(query),
                    timeout_secs = self.options.fetch_timeout.as_secs(),
                    "Document fetch timed out"
                );
                Vec::new()
            }
        }
    }

    async fn search(
        &self,
        query: &str,
    ) -> Result<Vec<crate::domain::vector_index::SearchHit>, DomainError> {
        let embedding = self.embedder.encode_one(query).await.inspect_err(|e| {
            warn!(query = log_preview(query), error = %e, "Failed to embed query")
        })?;

        let settings = self.processor.settings();
        let timeout = Duration::from_secs(settings.search_timeout_secs);

        tokio::time::timeout(
            timeout,
            self.index.search(&embedding, settings.max_retrieved_docs, None),
        )
        .await
        .map_err(|_| {
            DomainError::vector_index(format!(
                "Search timed out after {}s",
                settings.search_timeout_secs
            ))
        })?
    }

    /// Cache write-back is best effort; failures are logged
    async fn store(&self, query: &str, processed: &ProcessedContext) {
        let Some(cache) = &self.cache else {
            return;
        };

        if processed.chunks.is_empty() {
            return;
        }

        let value = match serde_json::to_value(processed) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to encode context for caching");
                return;
            }
        };

        if let Err(e) = cache
            .set(query, vec![value], self.options.cache_ttl_hours)
            .await
        {
            warn!(query = log_preview(query), error = %e, "Failed to cache context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::retrieval::{HeuristicTokenEstimator, MockDocumentFetcher, RetrievalSettings};
    use crate::domain::semantic_cache::CacheSettings;
    use crate::infrastructure::embedding::HashingEmbeddingProvider;
    use crate::infrastructure::retrieval::StaticDocumentFetcher;
    use crate::infrastructure::vector_index::FlatVectorIndex;

    const DIM: usize = 256;

    fn docs() -> Vec<SourceDocument> {
        vec![
            SourceDocument::new(
                "Rust ownership rules guarantee memory safety without a garbage collector.",
            )
            .with_url("https://example.org/ownership")
            .with_title("Ownership"),
            SourceDocument::new("Borrowing lets code use a value without taking ownership of it.")
                .with_url("https://example.org/borrowing")
                .with_title("Borrowing"),
            SourceDocument::new("Tokio is an asynchronous runtime for the Rust language.")
                .with_url("https://example.org/tokio")
                .with_title("Tokio"),
        ]
    }

    fn settings() -> RetrievalSettings {
        RetrievalSettings {
            min_relevance_score: 0.0,
            ..Default::default()
        }
    }

    fn service_with(
        embedder: Arc<dyn EmbeddingProvider>,
        with_cache: bool,
        settings: RetrievalSettings,
    ) -> RetrievalService {
        let index: Arc<dyn VectorIndex> = Arc::new(FlatVectorIndex::in_memory(DIM).unwrap());

        let cache = with_cache.then(|| {
            Arc::new(
                SemanticCache::new(
                    embedder.clone(),
                    Arc::new(FlatVectorIndex::in_memory(DIM).unwrap()),
                    CacheSettings::default(),
                )
                .unwrap(),
            )
        });

        let processor =
            RetrievalPostProcessor::new(settings, Arc::new(HeuristicTokenEstimator)).unwrap();

        RetrievalService::new(index, embedder, cache, processor, RetrievalOptions::default())
            .unwrap()
    }

    fn service(with_cache: bool) -> RetrievalService {
        service_with(
            Arc::new(HashingEmbeddingProvider::new(DIM).unwrap()),
            with_cache,
            settings(),
        )
    }

    #[tokio::test]
    async fn test_retrieve_then_cache_hit() {
        let service = service(true);

        let mut fetcher = MockDocumentFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_| Ok(docs()));

        let first = service
            .retrieve("rust ownership memory safety", &fetcher)
            .await
            .unwrap();

        assert!(!first.cache_hit);
        assert!(first.context.contains("ownership"));
        assert!(first.total_tokens > 0);
        assert!(first.total_tokens <= settings().max_context_tokens);

        let second = service
            .retrieve("rust ownership memory safety", &fetcher)
            .await
            .unwrap();

        assert!(second.cache_hit);
        assert_eq!(second.context, first.context);
        assert_eq!(second.documents, first.documents);
    }

    #[tokio::test]
    async fn test_reranked_documents_carry_score() {
        let service = service(false);
        let fetcher = StaticDocumentFetcher::new(docs());

        let outcome = service.retrieve("tokio runtime", &fetcher).await.unwrap();

        let top = &outcome.documents[0];
        assert!(top.text.contains("Tokio"));
        assert!(top.rerank_score.is_some());
        assert!(top.metadata.contains_key("rerank_score"));
    }

    #[tokio::test]
    async fn test_fetch_failure_uses_existing_index() {
        let service = service(false);
        service.ingest("seed", &docs()).await.unwrap();

        let mut fetcher = MockDocumentFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(DomainError::provider("search", "unavailable")));

        let outcome = service.retrieve("borrowing values", &fetcher).await.unwrap();
        assert!(outcome.context.contains("Borrowing"));
    }

    #[tokio::test]
    async fn test_ingest_batches_and_skips_duplicates() {
        let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
        let index: Arc<dyn VectorIndex> = Arc::new(FlatVectorIndex::in_memory(DIM).unwrap());
        let processor =
            RetrievalPostProcessor::new(settings(), Arc::new(HeuristicTokenEstimator)).unwrap();
        let service = RetrievalService::new(
            index,
            embedder.clone(),
            None,
            processor,
            RetrievalOptions {
                batch_size: 2,
                ..Default::default()
            },
        )
        .unwrap();

        let mut documents = docs();
        documents.push(SourceDocument::new("   "));

        let first = service.ingest("q", &documents).await.unwrap();
        assert_eq!(first.documents, 4);
        assert_eq!(first.added, 3);
        assert_eq!(embedder.calls(), 2);

        let second = service.ingest("q", &documents).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let service = service_with(
            Arc::new(MockEmbeddingProvider::new(DIM).with_error("offline")),
            true,
            settings(),
        );
        let fetcher = StaticDocumentFetcher::new(docs());

        let result = service.retrieve("anything", &fetcher).await;
        assert!(matches!(result, Err(DomainError::Provider { .. })));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let service = service(false);
        let fetcher = StaticDocumentFetcher::new(Vec::new());

        assert!(matches!(
            service.retrieve("  ", &fetcher).await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_index_yields_empty_context() {
        let service = service(true);
        let fetcher = StaticDocumentFetcher::new(Vec::new());

        let outcome = service.retrieve("nothing indexed", &fetcher).await.unwrap();

        assert!(outcome.context.is_empty());
        assert!(outcome.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_many() {
        let service = service(true);
        let fetcher = StaticDocumentFetcher::new(docs());
        let queries = vec![
            "rust ownership".to_string(),
            "tokio runtime".to_string(),
            "borrowing values".to_string(),
            "rust ownership".to_string(),
        ];

        let results = service.retrieve_many(&queries, &fetcher).await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(service.index().get_stats().await.unwrap().total_vectors, 3);
    }

    #[test]
    fn test_dimension_mismatch() {
        let processor =
            RetrievalPostProcessor::new(settings(), Arc::new(HeuristicTokenEstimator)).unwrap();

        let result = RetrievalService::new(
            Arc::new(FlatVectorIndex::in_memory(8).unwrap()),
            Arc::new(MockEmbeddingProvider::new(16)),
            None,
            processor,
            RetrievalOptions::default(),
        );

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}
