//! Vector index records and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::embedding::Vector;
use crate::domain::DomainError;

/// Opaque per-record metadata
pub type Metadata = HashMap<String, Value>;

/// Index implementation behind the `VectorIndex` trait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// In-process flat index mirrored to disk
    #[default]
    #[serde(alias = "faiss")]
    Flat,
    /// PostgreSQL table with an ivfflat index
    Pgvector,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Pgvector => "pgvector",
        }
    }
}

impl fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VectorBackend {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" | "faiss" => Ok(Self::Flat),
            "pgvector" | "postgres" => Ok(Self::Pgvector),
            other => Err(DomainError::configuration(format!(
                "Unknown vector backend '{}'",
                other
            ))),
        }
    }
}

/// A stored vector with its text and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vector,
    pub text: String,
    pub metadata: Metadata,
    /// SHA-256 of the text, used for ingest dedup
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// A search result, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Outcome of an `add` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// Ids of newly inserted records
    pub ids: Vec<String>,
    pub added: usize,
    /// Records skipped because their text was already indexed
    pub skipped: usize,
    /// False when the in-memory index is ahead of durable storage
    pub persisted: bool,
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub backend: VectorBackend,
    /// Bytes on disk or in the table
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Metadata filter; a record matches when its metadata contains the filter
///
/// Containment follows JSON `@>` semantics: objects match key by key,
/// arrays match when every filter element is contained in some element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter(Metadata);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Metadata {
        &self.0
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| json_contains(actual, expected))
        })
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

impl From<Metadata> for MetadataFilter {
    fn from(map: Metadata) -> Self {
        Self(map)
    }
}

fn json_contains(container: &Value, contained: &Value) -> bool {
    match (container, contained) {
        (Value::Object(outer), Value::Object(inner)) => inner.iter().all(|(key, value)| {
            outer
                .get(key)
                .is_some_and(|candidate| json_contains(candidate, value))
        }),
        (Value::Array(outer), Value::Array(inner)) => inner
            .iter()
            .all(|value| outer.iter().any(|candidate| json_contains(candidate, value))),
        (Value::Array(outer), scalar) if !scalar.is_object() => outer.contains(scalar),
        _ => container == contained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_filter_superset_match() {
        let metadata = meta(json!({"source": "arxiv", "year": 2024, "lang": "en"}));

        assert!(MetadataFilter::new().matches(&metadata));
        assert!(MetadataFilter::new().with("source", "arxiv").matches(&metadata));
        assert!(!MetadataFilter::new()
            .with("source", "arxiv")
            .with("year", 2023)
            .matches(&metadata));
        assert!(!MetadataFilter::new().with("missing", true).matches(&metadata));
    }

    #[test]
    fn test_filter_nested_containment() {
        let metadata = meta(json!({"tags": ["rust", "cache"], "author": {"name": "A", "org": "B"}}));

        assert!(MetadataFilter::new().with("tags", json!(["cache"])).matches(&metadata));
        assert!(MetadataFilter::new().with("tags", "rust").matches(&metadata));
        assert!(MetadataFilter::new()
            .with("author", json!({"name": "A"}))
            .matches(&metadata));
        assert!(!MetadataFilter::new()
            .with("tags", json!(["python"]))
            .matches(&metadata));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("faiss".parse::<VectorBackend>().unwrap(), VectorBackend::Flat);
        assert_eq!("PGVECTOR".parse::<VectorBackend>().unwrap(), VectorBackend::Pgvector);
        assert!("milvus".parse::<VectorBackend>().is_err());

        let backend: VectorBackend = serde_json::from_str("\"faiss\"").unwrap();
        assert_eq!(backend, VectorBackend::Flat);
    }
}
