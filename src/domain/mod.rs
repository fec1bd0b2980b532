//! Domain layer - Core types, traits and retrieval algorithms

pub mod embedding;
pub mod error;
pub mod retrieval;
pub mod semantic_cache;
pub mod vector_index;

pub use embedding::{EmbeddingProvider, Vector};
pub use error::DomainError;
pub use retrieval::{DocumentFetcher, RetrievalSettings, SourceDocument};
pub use semantic_cache::{CacheEntry, CacheHit, CacheSettings, CacheStats};
pub use vector_index::{VectorBackend, VectorIndex};
