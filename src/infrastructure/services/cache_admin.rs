//! Administrative operations over the semantic cache
//!
//! Typed reports for stats, health, entry inspection, maintenance,
//! export/import and backup. `AdminResponse` wraps any of them for the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::embedding::Vector;
use crate::domain::semantic_cache::{
    CacheEntry, CacheHit, CacheSettings, CacheSettingsUpdate, CacheStats, HitKind,
};
use crate::domain::DomainError;
use crate::infrastructure::semantic_cache::{CacheSnapshot, SemanticCache, CACHE_FILE};

/// Version tag of export documents
pub const EXPORT_VERSION: &str = "1.0";

const PREVIEW_CHARS: usize = 100;
const EMBEDDING_PREVIEW_DIMS: usize = 10;
const PROBE_RESULT_LIMIT: usize = 3;
const OPTIMIZE_EVICT_RATIO: f64 = 0.9;
/// Sub-directory of a backup holding the query index files
pub const QUERY_INDEX_BACKUP_DIR: &str = "query_index";

/// Structured outcome of an admin operation
#[derive(Debug, Clone, Serialize)]
pub struct AdminResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl AdminResponse {
    pub fn ok(message: impl Into<String>, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                success: true,
                message: message.into(),
                data: Some(data),
                timestamp: Utc::now(),
            },
            Err(e) => Self::failure(format!("Failed to encode response: {}", e)),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Render an operation result
    pub fn from_result<T: Serialize>(
        message: impl Into<String>,
        result: Result<T, DomainError>,
    ) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Overall cache condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// 0-100
    pub health_score: u32,
    pub usage_percent: f64,
    pub expired_percent: f64,
    pub average_access_count: f64,
    pub recommendations: Vec<String>,
    pub last_check: DateTime<Utc>,
}

impl HealthReport {
    /// Score usage, expired share and reuse of the cache
    pub fn from_stats(stats: &CacheStats, now: DateTime<Utc>) -> Self {
        let usage = stats.usage_percent;
        let expired = stats.expired_percent();
        let avg_access = stats.average_access_count;

        let mut score: i32 = 100;

        if usage > 90.0 {
            score -= 30;
        } else if usage > 80.0 {
            score -= 15;
        }

        if expired > 20.0 {
            score -= 25;
        } else if expired > 10.0 {
            score -= 10;
        }

        if avg_access < 1.5 {
            score -= 15;
        } else if avg_access < 2.0 {
            score -= 5;
        }

        let status = match score {
            s if s >= 80 => HealthStatus::Healthy,
            s if s >= 60 => HealthStatus::Warning,
            _ => HealthStatus::Critical,
        };

        let mut recommendations = Vec::new();
        if usage > 85.0 {
            recommendations.push("Increase max_cache_size or evict old entries".to_string());
        }
        if expired > 15.0 {
            recommendations.push("Run cleanup to remove expired entries".to_string());
        }
        if avg_access < 2.0 {
            recommendations
                .push("Entries are rarely reused; consider lowering the similarity threshold".to_string());
        }

        Self {
            status,
            health_score: score.max(0) as u32,
            usage_percent: usage,
            expired_percent: expired,
            average_access_count: avg_access,
            recommendations,
            last_check: now,
        }
    }
}

/// Listing row for an entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub query_hash: String,
    /// First 100 characters of the query
    pub query_text: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub ttl_hours: u32,
    pub is_expired: bool,
    pub results_count: usize,
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryListing {
    pub entries: Vec<EntrySummary>,
    pub total: usize,
    pub query: Option<String>,
    pub include_expired: bool,
}

/// Full view of one entry with a truncated embedding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDetail {
    pub query_hash: String,
    pub query_text: String,
    /// Leading dimensions only
    pub query_embedding: Vector,
    pub embedding_dimension: usize,
    pub results: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub ttl_hours: u32,
    pub is_expired: bool,
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub expired_removed: usize,
    pub evicted: usize,
    pub orphans_removed: usize,
    pub versions_removed: usize,
    pub entries_before: usize,
    pub entries_after: usize,
    pub space_freed: usize,
    pub cache_usage_before: f64,
    pub cache_usage_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Export document
#[derive(Debug, Clone, Serialize)]
pub struct CacheExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub config: CacheSettings,
    pub stats: CacheStats,
    pub entries: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported_count: usize,
    pub skipped_count: usize,
    /// Entries that could not be parsed
    pub error_count: usize,
    pub re_embedded_count: usize,
    /// Entries evicted to stay within capacity
    pub evicted_count: usize,
    pub total_entries: usize,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupReport {
    pub path: PathBuf,
    pub entries: usize,
    pub index_backed_up: bool,
}

/// Result of a lookup made for inspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub query: String,
    pub similarity_threshold: Option<f32>,
    pub cache_hit: bool,
    pub kind: Option<HitKind>,
    pub similarity: Option<f32>,
    pub matched_query: Option<String>,
    pub result_count: usize,
    /// First three results
    pub results: Vec<Value>,
}

impl ProbeReport {
    fn new(query: &str, threshold: Option<f32>, hit: Option<CacheHit>) -> Self {
        match hit {
            Some(hit) => Self {
                query: query.to_string(),
                similarity_threshold: threshold,
                cache_hit: true,
                kind: Some(hit.kind),
                similarity: Some(hit.similarity),
                matched_query: Some(hit.matched_query),
                result_count: hit.results.len(),
                results: hit.results.into_iter().take(PROBE_RESULT_LIMIT).collect(),
            },
            None => Self {
                query: query.to_string(),
                similarity_threshold: threshold,
                cache_hit: false,
                kind: None,
                similarity: None,
                matched_query: None,
                result_count: 0,
                results: Vec::new(),
            },
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Admin facade over a semantic cache
#[derive(Debug, Clone)]
pub struct CacheAdmin {
    cache: Arc<SemanticCache>,
    keep_versions: usize,
}

impl CacheAdmin {
    pub fn new(cache: Arc<SemanticCache>, keep_versions: usize) -> Self {
        Self {
            cache,
            keep_versions,
        }
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn health(&self) -> HealthReport {
        let stats = self.cache.stats().await;
        HealthReport::from_stats(&stats, self.cache.now())
    }

    /// Case-insensitive substring search over query texts, most recent first
    pub async fn search_entries(
        &self,
        query: Option<&str>,
        limit: usize,
        include_expired: bool,
    ) -> EntryListing {
        let now = self.cache.now();
        let needle = query.map(str::to_lowercase);

        let mut matching: Vec<CacheEntry> = self
            .cache
            .entries()
            .await
            .into_iter()
            .filter(|e| include_expired || !e.is_expired(now))
            .filter(|e| {
                needle
                    .as_ref()
                    .is_none_or(|n| e.query_text.to_lowercase().contains(n.as_str()))
            })
            .collect();

        matching.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        matching.truncate(limit);

        let entries: Vec<EntrySummary> = matching
            .into_iter()
            .map(|e| EntrySummary {
                is_expired: e.is_expired(now),
                query_text: preview(&e.query_text),
                results_count: e.results.len(),
                query_hash: e.query_hash,
                created_at: e.created_at,
                last_accessed: e.last_accessed,
                access_count: e.access_count,
                ttl_hours: e.ttl_hours,
                similarity_threshold: e.similarity_threshold,
            })
            .collect();

        EntryListing {
            total: entries.len(),
            entries,
            query: query.map(str::to_string),
            include_expired,
        }
    }

    pub async fn entry_detail(&self, hash: &str) -> Result<EntryDetail, DomainError> {
        let entry = self
            .cache
            .entry(hash)
            .await
            .ok_or_else(|| DomainError::not_found(format!("Cache entry '{}' not found", hash)))?;

        let now = self.cache.now();

        Ok(EntryDetail {
            is_expired: entry.is_expired(now),
            expires_at: entry.expires_at(),
            embedding_dimension: entry.query_embedding.len(),
            query_embedding: entry
                .query_embedding
                .iter()
                .take(EMBEDDING_PREVIEW_DIMS)
                .copied()
                .collect(),
            query_hash: entry.query_hash,
            query_text: entry.query_text,
            results: entry.results,
            created_at: entry.created_at,
            last_accessed: entry.last_accessed,
            access_count: entry.access_count,
            ttl_hours: entry.ttl_hours,
            similarity_threshold: entry.similarity_threshold,
        })
    }

    pub async fn delete_entry(&self, hash: &str) -> Result<(), DomainError> {
        if !self.cache.remove(hash).await? {
            return Err(DomainError::not_found(format!(
                "Cache entry '{}' not found",
                hash
            )));
        }

        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<usize, DomainError> {
        self.cache.cleanup_expired().await
    }

    pub async fn evict_lru(&self) -> Result<usize, DomainError> {
        self.cache.evict_lru().await
    }

    /// Cleanup, evict when above 90% usage, then compact the query index
    pub async fn optimize(&self) -> Result<OptimizeReport, DomainError> {
        let before = self.cache.stats().await;

        let expired_removed = self.cache.cleanup_expired().await?;

        let settings = self.cache.settings().await;
        let evicted = if self.cache.len().await as f64
            > settings.max_cache_size as f64 * OPTIMIZE_EVICT_RATIO
        {
            self.cache.evict_lru().await?
        } else {
            0
        };

        let compact = match self.cache.compact(self.keep_versions).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Failed to compact query index");
                Default::default()
            }
        };

        let after = self.cache.stats().await;

        let report = OptimizeReport {
            expired_removed,
            evicted,
            orphans_removed: compact.orphans_removed,
            versions_removed: compact.versions_removed,
            entries_before: before.total_entries,
            entries_after: after.total_entries,
            space_freed: before.total_entries.saturating_sub(after.total_entries),
            cache_usage_before: before.usage_percent,
            cache_usage_after: after.usage_percent,
            timestamp: self.cache.now(),
        };

        info!(
            expired_removed = report.expired_removed,
            evicted = report.evicted,
            entries_after = report.entries_after,
            "Cache optimized"
        );

        Ok(report)
    }

    pub async fn clear_all(&self) -> Result<(), DomainError> {
        self.cache.clear().await
    }

    /// Export all entries, optionally without their embeddings
    pub async fn export(&self, include_embeddings: bool) -> Result<CacheExport, DomainError> {
        let entries = self
            .cache
            .entries()
            .await
            .into_iter()
            .map(|entry| -> Result<Value, DomainError> {
                let mut value = serde_json::to_value(entry)?;
                if !include_embeddings {
                    if let Some(obj) = value.as_object_mut() {
                        obj.remove("query_embedding");
                    }
                }
                Ok(value)
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(CacheExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: self.cache.now(),
            config: self.cache.settings().await,
            stats: self.cache.stats().await,
            entries,
        })
    }

    /// Import entries from an export document
    ///
    /// Unparseable entries are counted and skipped. When writing the result
    /// fails the cache is restored to its pre-import contents.
    pub async fn import(&self, document: &Value, overwrite: bool) -> Result<ImportReport, DomainError> {
        let raw = document
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| DomainError::validation("Import document has no 'entries' array"))?;

        let mut report = ImportReport {
            total_entries: raw.len(),
            ..Default::default()
        };

        let mut parsed = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<CacheEntry>(value.clone()) {
                Ok(entry) => parsed.push(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cache entry");
                    report.error_count += 1;
                }
            }
        }

        let backup = self.cache.entries().await;

        match self.cache.insert_entries(parsed, overwrite).await {
            Ok(inserted) => {
                report.imported_count = inserted.inserted;
                report.skipped_count = inserted.skipped;
                report.re_embedded_count = inserted.re_embedded;
                report.evicted_count = inserted.evicted;
                report.timestamp = Some(self.cache.now());

                info!(
                    imported = report.imported_count,
                    skipped = report.skipped_count,
                    evicted = report.evicted_count,
                    errors = report.error_count,
                    "Cache import completed"
                );

                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Cache import failed, restoring previous entries");

                if let Err(restore_error) = self.cache.replace_entries(backup).await {
                    error!(error = %restore_error, "Failed to restore cache after import");
                }

                Err(e)
            }
        }
    }

    pub async fn update_config(
        &self,
        update: &CacheSettingsUpdate,
    ) -> Result<CacheSettings, DomainError> {
        if update.is_empty() {
            return Err(DomainError::validation("No settings to update"));
        }

        self.cache.update_settings(update).await
    }

    /// Copy the cache snapshot and the query index into `dir`
    pub async fn backup(&self, dir: &Path) -> Result<BackupReport, DomainError> {
        tokio::fs::create_dir_all(dir).await?;

        let entries = self.cache.entries().await;
        let count = entries.len();
        CacheSnapshot::new(entries, self.cache.now())
            .write(&dir.join(CACHE_FILE))
            .await?;

        let index_backed_up = self
            .cache
            .query_index()
            .backup(&dir.join(QUERY_INDEX_BACKUP_DIR))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to back up query index");
                false
            });

        info!(path = %dir.display(), entries = count, "Cache backed up");

        Ok(BackupReport {
            path: dir.to_path_buf(),
            entries: count,
            index_backed_up,
        })
    }

    /// Run a lookup and report how it was answered
    pub async fn probe(
        &self,
        query: &str,
        similarity_threshold: Option<f32>,
    ) -> Result<ProbeReport, DomainError> {
        let hit = self.cache.get(query, similarity_threshold).await?;
        Ok(ProbeReport::new(query, similarity_threshold, hit))
    }
}
