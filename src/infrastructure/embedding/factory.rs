//! Embedding provider factory

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{CachedEmbeddingProvider, HashingEmbeddingProvider, HttpClient, OpenAiEmbeddingProvider};
use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

/// Factory for creating embedding providers
#[derive(Debug)]
pub struct EmbeddingProviderFactory;

impl EmbeddingProviderFactory {
    /// Create the configured provider, wrapped in an in-memory cache when enabled
    pub fn create(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
        let provider: Arc<dyn EmbeddingProvider> = match config.provider {
            EmbeddingProviderType::Hashing => Arc::new(HashingEmbeddingProvider::with_model(
                config.model.clone(),
                config.dimensions,
            )?),
            EmbeddingProviderType::OpenAi => {
                let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                    DomainError::configuration(format!(
                        "Environment variable {} is not set",
                        config.api_key_env
                    ))
                })?;
                let client = HttpClient::with_timeout(Duration::from_secs(config.timeout_secs))?;

                match &config.base_url {
                    Some(base_url) => Arc::new(OpenAiEmbeddingProvider::with_base_url(
                        client,
                        api_key,
                        config.model.clone(),
                        config.dimensions,
                        base_url.clone(),
                    )),
                    None => Arc::new(OpenAiEmbeddingProvider::new(
                        client,
                        api_key,
                        config.model.clone(),
                        config.dimensions,
                    )),
                }
            }
        };

        info!(
            provider = provider.provider_name(),
            model = provider.model(),
            dimensions = provider.dimensions(),
            "Embedding provider created"
        );

        if config.cache_capacity == 0 {
            return Ok(provider);
        }

        Ok(Arc::new(CachedEmbeddingProvider::new(
            provider,
            config.cache_capacity,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_hashing_provider() {
        let config = EmbeddingConfig {
            dimensions: 16,
            ..Default::default()
        };

        let provider = EmbeddingProviderFactory::create(&config).unwrap();

        assert_eq!(provider.provider_name(), "hashing");
        assert_eq!(provider.dimensions(), 16);
        assert_eq!(provider.encode_one("text").await.unwrap().len(), 16);
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::OpenAi,
            api_key_env: "PMP_RAG_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            EmbeddingProviderFactory::create(&config),
            Err(DomainError::Configuration { .. })
        ));
    }
}
