//! JSON snapshot of the cache entries

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::semantic_cache::CacheEntry;
use crate::domain::DomainError;
use crate::infrastructure::vector_index::write_atomic;

/// File name of the snapshot inside the cache directory
pub const CACHE_FILE: &str = "rag_cache.json";

const SNAPSHOT_VERSION: &str = "1.0";

/// On-disk cache document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub total_entries: usize,
    pub entries: Vec<CacheEntry>,
}

impl CacheSnapshot {
    pub fn new(entries: Vec<CacheEntry>, now: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            created_at: now,
            total_entries: entries.len(),
            entries,
        }
    }

    pub async fn write(&self, path: &Path) -> Result<(), DomainError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes).await
    }

    /// Read a snapshot; `Ok(None)` when the file does not exist
    pub async fn read(path: &Path) -> Result<Option<Self>, DomainError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Entries still alive at `now`
    pub fn live_entries(self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        self.entries
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CACHE_FILE);
        let now = Utc::now();

        let entry = CacheEntry::new("q", vec![0.1, 0.2], vec![serde_json::json!({"a": 1})], 24, 0.85, now);
        CacheSnapshot::new(vec![entry.clone()], now)
            .write(&path)
            .await
            .unwrap();

        let snapshot = CacheSnapshot::read(&path).await.unwrap().unwrap();

        assert_eq!(snapshot.version, "1.0");
        assert_eq!(snapshot.total_entries, 1);
        assert_eq!(snapshot.entries, vec![entry]);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(CacheSnapshot::read(&dir.path().join("none.json"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_expired_entries_dropped() {
        let now = Utc::now();
        let old = CacheEntry::new("old", vec![], vec![], 1, 0.85, now - Duration::hours(2));
        let fresh = CacheEntry::new("fresh", vec![], vec![], 1, 0.85, now);

        let live = CacheSnapshot::new(vec![old, fresh], now).live_entries(now);

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].query_text, "fresh");
    }
}
