//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, CacheConfig, EmbeddingConfig, EmbeddingProviderType, LogFormat, LoggingConfig,
    RetrievalConfig, TokenCounterType, VectorStoreConfig,
};
