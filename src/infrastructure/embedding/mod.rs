//! Embedding provider implementations

mod cached;
mod factory;
mod hashing;
mod http_client;
mod openai;

pub use cached::CachedEmbeddingProvider;
pub use factory::EmbeddingProviderFactory;
pub use hashing::HashingEmbeddingProvider;
pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::OpenAiEmbeddingProvider;
