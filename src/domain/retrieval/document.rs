//! Documents flowing through retrieval

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::vector_index::{Metadata, SearchHit};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// A raw document returned by an external source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            title: None,
            source: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Metadata stored next to the vector for this document
    pub fn metadata(&self, query: &str) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("url".to_string(), self.url.clone().into());
        meta.insert("title".to_string(), self.title.clone().into());
        meta.insert(
            "source".to_string(),
            self.source.clone().unwrap_or_else(|| "unknown".to_string()).into(),
        );
        meta.insert("query".to_string(), query.into());
        meta
    }
}

/// A candidate produced by vector search and refined by post-processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub metadata: Metadata,
    /// Vector similarity from the index
    pub score: f32,
    /// BM25 score once reranked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, metadata: Metadata, score: f32) -> Self {
        Self {
            text: text.into(),
            metadata,
            score,
            rerank_score: None,
        }
    }

    /// Identity of the originating source, `(url, title)`
    pub fn source_key(&self) -> (String, String) {
        let field = |key: &str| {
            self.metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        (field("url"), field("title"))
    }
}

impl From<SearchHit> for RetrievedDocument {
    fn from(hit: SearchHit) -> Self {
        Self::new(hit.text, hit.metadata, hit.score)
    }
}

/// External multi-source retrieval
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch candidate documents for a query
    async fn fetch(&self, query: &str) -> Result<Vec<SourceDocument>, DomainError>;
}
