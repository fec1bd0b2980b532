//! In-memory embedding cache decorator

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;

use crate::domain::embedding::{EmbeddingProvider, Vector};
use crate::domain::DomainError;

/// Wraps a provider and remembers embeddings per exact text
#[derive(Debug)]
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Cache<String, Vector>,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_idle(Duration::from_secs(3600))
            .build();

        Self { inner, cache }
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vector>, DomainError> {
        let mut vectors: Vec<Option<Vector>> = texts.iter().map(|t| self.cache.get(t)).collect();

        let missing: Vec<String> = texts
            .iter()
            .zip(&vectors)
            .filter(|(_, cached)| cached.is_none())
            .map(|(text, _)| text.clone())
            .collect();

        if !missing.is_empty() {
            let encoded = self.inner.encode(&missing).await?;

            if encoded.len() != missing.len() {
                return Err(DomainError::provider(
                    self.inner.provider_name(),
                    format!(
                        "Expected {} embeddings, received {}",
                        missing.len(),
                        encoded.len()
                    ),
                ));
            }

            let mut fresh = missing.into_iter().zip(encoded);
            for slot in vectors.iter_mut().filter(|slot| slot.is_none()) {
                if let Some((text, vector)) = fresh.next() {
                    self.cache.insert(text, vector.clone());
                    *slot = Some(vector);
                }
            }
        }

        vectors
            .into_iter()
            .map(|v| v.ok_or_else(|| DomainError::internal("Embedding missing after encode")))
            .collect()
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}
