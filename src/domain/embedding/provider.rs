//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::Vector;
use crate::domain::DomainError;

/// Trait for embedding providers (hashing, OpenAI-compatible, etc.)
///
/// Implementations must be deterministic for identical input and return one
/// vector of `dimensions()` floats per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Encode a batch of texts
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vector>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the model identifier
    fn model(&self) -> &str;

    /// Get the embedding dimensions
    fn dimensions(&self) -> usize;

    /// Encode a single text
    async fn encode_one(&self, text: &str) -> Result<Vector, DomainError> {
        let mut vectors = self.encode(&[text.to_string()]).await?;

        vectors.pop().ok_or_else(|| {
            DomainError::provider(self.provider_name(), "Provider returned no embedding")
        })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic provider that can be switched into a failing mode
    #[derive(Debug)]
    pub struct MockEmbeddingProvider {
        dimensions: usize,
        error: Option<String>,
        calls: AtomicUsize,
    }

    impl MockEmbeddingProvider {
        pub fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }

        fn vector_for(&self, text: &str) -> Vector {
            let hash = text
                .bytes()
                .fold(1469598103934665603u64, |acc, b| {
                    (acc ^ b as u64).wrapping_mul(1099511628211)
                });

            (0..self.dimensions)
                .map(|i| {
                    let mixed = hash.rotate_left((i % 64) as u32).wrapping_add(i as u64);
                    ((mixed % 1000) as f32 / 1000.0) - 0.5
                })
                .collect()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vector>, DomainError> {
            self.calls.fetch_add(1, Ordering::Relaxed);

            if let Some(ref error) = self.error {
                return Err(DomainError::provider("mock", error.clone()));
            }

            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-embedding"
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_provider_batch_input() {
            let provider = MockEmbeddingProvider::new(16);

            let vectors = provider
                .encode(&["Hello".to_string(), "World".to_string()])
                .await
                .unwrap();

            assert_eq!(vectors.len(), 2);
            assert!(vectors.iter().all(|v| v.len() == 16));
            assert_ne!(vectors[0], vectors[1]);
        }

        #[tokio::test]
        async fn test_mock_provider_error() {
            let provider = MockEmbeddingProvider::new(16).with_error("API error");

            let result = provider.encode_one("Hello").await;

            assert!(matches!(result, Err(DomainError::Provider { .. })));
            assert_eq!(provider.calls(), 1);
        }

        #[tokio::test]
        async fn test_deterministic_embeddings() {
            let provider = MockEmbeddingProvider::new(32);

            let first = provider.encode_one("Hello").await.unwrap();
            let second = provider.encode_one("Hello").await.unwrap();

            assert_eq!(first, second);
        }
    }
}
