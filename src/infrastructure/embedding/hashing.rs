//! Offline feature-hashing embedding provider

use async_trait::async_trait;

use crate::domain::embedding::{normalized, EmbeddingProvider, Vector};
use crate::domain::retrieval::tokenize;
use crate::domain::DomainError;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Deterministic embeddings from hashed token counts
///
/// Each token of the mixed-script token stream adds ±1 to one of
/// `dimensions` buckets; the result is L2-normalized. Word order is ignored,
/// so texts sharing vocabulary end up close.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    model: String,
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self, DomainError> {
        Self::with_model("feature-hashing", dimensions)
    }

    pub fn with_model(model: impl Into<String>, dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::configuration(
                "Embedding dimensions must be greater than 0",
            ));
        }

        Ok(Self {
            model: model.into(),
            dimensions,
        })
    }

    fn embed(&self, text: &str) -> Vector {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalized(&vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vector>, DomainError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::{cosine_similarity, l2_norm};

    #[tokio::test]
    async fn test_vectors_are_normalized_and_sized() {
        let provider = HashingEmbeddingProvider::new(384).unwrap();

        let vector = provider.encode_one("Semantic caching in Rust").await.unwrap();

        assert_eq!(vector.len(), 384);
        assert!((l2_norm(&vector) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashingEmbeddingProvider::new(64).unwrap();

        let first = provider.encode_one("向量检索 vector search").await.unwrap();
        let second = provider.encode_one("向量检索 vector search").await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_paraphrase_similarity() {
        let provider = HashingEmbeddingProvider::new(384).unwrap();

        let a = provider.encode_one("machine learning basics").await.unwrap();
        let b = provider.encode_one("basics of machine learning").await.unwrap();
        let c = provider.encode_one("medieval castle architecture").await.unwrap();

        assert!(cosine_similarity(&a, &b) >= 0.8);
        assert!(cosine_similarity(&a, &c) < 0.5);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8).unwrap();

        let vector = provider.encode_one("").await.unwrap();

        assert!(vector.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            HashingEmbeddingProvider::new(0),
            Err(DomainError::Configuration { .. })
        ));
    }
}
