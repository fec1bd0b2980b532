//! Cache entries, hits and statistics

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::embedding::Vector;
use crate::domain::vector_index::IndexStats;

/// Deterministic key of a query: SHA-256 of its exact text
pub fn query_hash(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

/// A cached query and its results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_hash: String,
    pub query_text: String,
    /// Empty when imported from an export without embeddings
    #[serde(default)]
    pub query_embedding: Vector,
    pub results: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_similarity_threshold() -> f32 {
    0.85
}

impl CacheEntry {
    /// Create a fresh entry with one recorded access
    pub fn new(
        query_text: impl Into<String>,
        query_embedding: Vector,
        results: Vec<Value>,
        ttl_hours: u32,
        similarity_threshold: f32,
        now: DateTime<Utc>,
    ) -> Self {
        let query_text = query_text.into();

        Self {
            query_hash: query_hash(&query_text),
            query_text,
            query_embedding,
            results,
            created_at: now,
            last_accessed: now,
            access_count: 1,
            ttl_hours,
            similarity_threshold,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::hours(i64::from(self.ttl_hours))
    }

    /// Expired strictly after `created_at + ttl_hours`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Record a hit
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.access_count += 1;
    }

    pub fn has_embedding(&self) -> bool {
        !self.query_embedding.is_empty()
    }
}

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Exact,
    Similar,
}

/// A successful cache lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHit {
    pub results: Vec<Value>,
    pub kind: HitKind,
    /// 1.0 for exact hits
    pub similarity: f32,
    /// Query text of the entry that matched
    pub matched_query: String,
    pub query_hash: String,
    pub access_count: u64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub max_cache_size: usize,
    pub usage_percent: f64,
    pub average_access_count: f64,
    pub similarity_threshold: f32,
    pub default_ttl_hours: u32,
    pub hits: u64,
    pub misses: u64,
    /// Stats of the query-vector index, when it could be read
    pub query_index: Option<IndexStats>,
}

impl CacheStats {
    pub fn expired_percent(&self) -> f64 {
        self.expired_entries as f64 / self.total_entries.max(1) as f64 * 100.0
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }

        self.hits as f64 / lookups as f64
    }
}
