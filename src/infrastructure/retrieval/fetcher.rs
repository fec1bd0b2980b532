//! Document fetcher serving a fixed document set

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::retrieval::{DocumentFetcher, SourceDocument};
use crate::domain::DomainError;

/// Returns the same documents for every query
///
/// Backs the CLI, where documents come from a JSON file rather than a live
/// search source. An empty fetcher makes retrieval search the existing index only.
#[derive(Debug, Clone, Default)]
pub struct StaticDocumentFetcher {
    documents: Vec<SourceDocument>,
}

impl StaticDocumentFetcher {
    pub fn new(documents: Vec<SourceDocument>) -> Self {
        Self { documents }
    }

    /// Load a JSON array of `{text, url, title, source}` objects
    pub async fn from_file(path: &Path) -> Result<Self, DomainError> {
        let bytes = tokio::fs::read(path).await?;
        let documents: Vec<SourceDocument> = serde_json::from_slice(&bytes)?;

        debug!(path = %path.display(), documents = documents.len(), "Loaded documents");

        Ok(Self::new(documents))
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }
}

#[async_trait]
impl DocumentFetcher for StaticDocumentFetcher {
    async fn fetch(&self, _query: &str) -> Result<Vec<SourceDocument>, DomainError> {
        Ok(self.documents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs.json");
        tokio::fs::write(
            &path,
            r#"[{"text": "Rust ownership", "url": "https://example.org/rust"}, {"text": "bare"}]"#,
        )
        .await
        .unwrap();

        let fetcher = StaticDocumentFetcher::from_file(&path).await.unwrap();
        let docs = fetcher.fetch("anything").await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].url.as_deref(), Some("https://example.org/rust"));
        assert!(docs[1].title.is_none());
    }

    #[tokio::test]
    async fn test_invalid_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = StaticDocumentFetcher::from_file(&path).await;
        assert!(matches!(result, Err(DomainError::Storage { .. })));
    }
}
