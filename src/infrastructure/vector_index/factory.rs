//! Vector index factory

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::flat::{FlatIndexPaths, FlatVectorIndex};
use super::pgvector::{PgvectorConfig, PgvectorIndex};
use crate::config::VectorStoreConfig;
use crate::domain::vector_index::{VectorBackend, VectorIndex};
use crate::domain::DomainError;

/// Files of the cache's query-vector index inside `cache_dir`
pub const QUERY_INDEX_FILE: &str = "query_index.bin";
pub const QUERY_META_FILE: &str = "query_meta.json";

/// Factory for creating vector indexes
#[derive(Debug)]
pub struct VectorIndexFactory;

impl VectorIndexFactory {
    /// Create the document index selected by `config.backend`
    pub async fn create(config: &VectorStoreConfig) -> Result<Arc<dyn VectorIndex>, DomainError> {
        let index: Arc<dyn VectorIndex> = match config.backend {
            VectorBackend::Flat => {
                let paths =
                    FlatIndexPaths::in_dir(&config.data_dir, &config.index_file, &config.meta_file);

                Arc::new(
                    FlatVectorIndex::open(config.dimension, paths)
                        .await?
                        .with_filter_widening(config.filter_widening),
                )
            }
            VectorBackend::Pgvector => {
                let dsn = config.resolve_dsn().ok_or_else(|| {
                    DomainError::configuration(
                        "pgvector backend requires vector_store.pg_dsn or DATABASE_URL",
                    )
                })?;

                let pg_config = PgvectorConfig::new(config.dimension)
                    .with_table_name(&config.pg_table)
                    .with_filter_widening(config.filter_widening);

                Arc::new(PgvectorIndex::connect(&dsn, pg_config).await?)
            }
        };

        info!(
            backend = %config.backend,
            dimension = config.dimension,
            "Vector index created"
        );

        Ok(index)
    }

    /// Create the flat index holding cached query embeddings
    pub async fn create_query_index(
        cache_dir: &Path,
        dimension: usize,
    ) -> Result<Arc<dyn VectorIndex>, DomainError> {
        let paths = FlatIndexPaths::in_dir(cache_dir, QUERY_INDEX_FILE, QUERY_META_FILE);
        Ok(Arc::new(FlatVectorIndex::open(dimension, paths).await?))
    }

    /// Create a non-persistent flat index
    pub fn create_in_memory(dimension: usize) -> Result<Arc<dyn VectorIndex>, DomainError> {
        Ok(Arc::new(FlatVectorIndex::in_memory(dimension)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vector_index::Metadata;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_flat_from_config() {
        let dir = TempDir::new().unwrap();
        let config = VectorStoreConfig {
            data_dir: dir.path().to_path_buf(),
            dimension: 3,
            ..Default::default()
        };

        let index = VectorIndexFactory::create(&config).await.unwrap();
        assert_eq!(index.backend(), VectorBackend::Flat);
        assert_eq!(index.dimension(), 3);

        index
            .add(vec![vec![1.0, 0.0, 0.0]], vec!["a".to_string()], vec![Metadata::new()])
            .await
            .unwrap();

        assert!(dir.path().join("vectors.index").exists());
        assert!(dir.path().join("vectors_meta.json").exists());
    }

    #[tokio::test]
    async fn test_pgvector_without_dsn_is_configuration_error() {
        let config = VectorStoreConfig {
            backend: VectorBackend::Pgvector,
            pg_dsn: Some(" ".to_string()),
            ..Default::default()
        };

        if std::env::var("DATABASE_URL").is_ok() {
            return;
        }

        let result = VectorIndexFactory::create(&config).await;
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_query_index_files() {
        let dir = TempDir::new().unwrap();
        let index = VectorIndexFactory::create_query_index(dir.path(), 2)
            .await
            .unwrap();

        index
            .add(vec![vec![0.0, 1.0]], vec!["q".to_string()], vec![Metadata::new()])
            .await
            .unwrap();

        assert!(dir.path().join(QUERY_INDEX_FILE).exists());
        assert!(dir.path().join(QUERY_META_FILE).exists());
    }
}
