//! Embedding provider domain models and traits

mod provider;
mod vector;

pub use provider::EmbeddingProvider;
pub use vector::{cosine_similarity, dot, ensure_dimension, l2_norm, normalized, Vector};

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
