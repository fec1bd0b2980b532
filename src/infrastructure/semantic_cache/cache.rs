//! Similarity-aware query cache
//!
//! Entries live in a map keyed by query hash; their query embeddings are
//! also stored in a dedicated vector index used for similarity lookups.
//! Every mutation rewrites the JSON snapshot; hits only touch memory and are
//! written out with the next snapshot.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::snapshot::CacheSnapshot;
use crate::domain::embedding::{cosine_similarity, EmbeddingProvider, Vector};
use crate::domain::semantic_cache::{
    query_hash, validate_threshold, CacheEntry, CacheHit, CacheSettings, CacheSettingsUpdate,
    CacheStats, Clock, HitKind, SystemClock,
};
use crate::domain::vector_index::{Metadata, VectorIndex};
use crate::domain::DomainError;
use crate::infrastructure::logging::log_preview;
use crate::infrastructure::observability::{
    record_cache_evictions, record_cache_expired, record_cache_lookup, record_cache_size,
    LookupOutcome,
};

/// Metadata key linking a query vector to its cache entry
pub const QUERY_HASH_KEY: &str = "query_hash";

/// Result of a `set`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetOutcome {
    pub query_hash: String,
    /// Entries removed by LRU eviction
    pub evicted: usize,
    /// False when the snapshot could not be written
    pub persisted: bool,
}

/// Result of `insert_entries`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted: usize,
    pub skipped: usize,
    /// Entries that arrived without an embedding
    pub re_embedded: usize,
    /// Entries removed to stay within `max_cache_size`
    pub evicted: usize,
}

/// Result of `compact`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactReport {
    pub orphans_removed: usize,
    pub versions_removed: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Hashes removed from `entries` whose vectors may remain in the index
    orphans: HashSet<String>,
}

impl CacheState {
    fn remove(&mut self, hash: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(hash);
        if removed.is_some() {
            self.orphans.insert(hash.to_string());
        }
        removed
    }

    /// Remove the `count` least recently accessed entries, sparing `keep`
    fn evict_lru(&mut self, count: usize, keep: Option<&str>) -> usize {
        let mut candidates: Vec<(chrono::DateTime<chrono::Utc>, String)> = self
            .entries
            .values()
            .filter(|e| Some(e.query_hash.as_str()) != keep)
            .map(|e| (e.last_accessed, e.query_hash.clone()))
            .collect();

        candidates.sort();

        let victims: Vec<String> = candidates
            .into_iter()
            .take(count)
            .map(|(_, hash)| hash)
            .collect();

        for hash in &victims {
            self.remove(hash);
        }

        victims.len()
    }

    fn remove_expired(&mut self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.query_hash.clone())
            .collect();

        for hash in &expired {
            self.remove(hash);
        }

        expired.len()
    }
}

/// Number of entries removed by one LRU pass
fn eviction_batch(len: usize) -> usize {
    (len / 10).max(1)
}

/// Semantic query cache
#[derive(Debug)]
pub struct SemanticCache {
    embedder: Arc<dyn EmbeddingProvider>,
    query_index: Arc<dyn VectorIndex>,
    clock: Arc<dyn Clock>,
    snapshot_path: Option<PathBuf>,
    settings: RwLock<CacheSettings>,
    state: RwLock<CacheState>,
    snapshot_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SemanticCache {
    /// Create a cache without a snapshot file
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        query_index: Arc<dyn VectorIndex>,
        settings: CacheSettings,
    ) -> Result<Self, DomainError> {
        Self::build(embedder, query_index, settings, None, Arc::new(SystemClock))
    }

    /// Create a cache mirrored to `snapshot_path`, loading live entries from it
    pub async fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        query_index: Arc<dyn VectorIndex>,
        settings: CacheSettings,
        snapshot_path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DomainError> {
        let snapshot_path = snapshot_path.into();
        let cache = Self::build(
            embedder,
            query_index,
            settings,
            Some(snapshot_path.clone()),
            clock,
        )?;

        match CacheSnapshot::read(&snapshot_path).await {
            Ok(Some(snapshot)) => {
                let stored = snapshot.entries.len();
                let live = snapshot.live_entries(cache.clock.now());

                info!(
                    path = %snapshot_path.display(),
                    loaded = live.len(),
                    expired = stored - live.len(),
                    "Loaded cache snapshot"
                );

                let mut state = cache.state.write().await;
                state.entries = live
                    .into_iter()
                    .map(|entry| (entry.query_hash.clone(), entry))
                    .collect();
                record_cache_size(state.entries.len());
            }
            Ok(None) => {
                debug!(path = %snapshot_path.display(), "No cache snapshot found");
            }
            Err(e) => {
                error!(
                    path = %snapshot_path.display(),
                    error = %e,
                    "Failed to load cache snapshot, starting empty"
                );
            }
        }

        cache.reconcile_query_index().await;

        Ok(cache)
    }

    /// Drop query vectors whose entry is no longer live
    ///
    /// Removed hashes are only tracked in memory, so vectors of entries that
    /// expired or were evicted before a restart are found here.
    async fn reconcile_query_index(&self) -> usize {
        let live: Vec<Value> = self
            .state
            .read()
            .await
            .entries
            .keys()
            .cloned()
            .map(Value::String)
            .collect();

        match self.query_index.retain_by_metadata(QUERY_HASH_KEY, &live).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed = removed, "Dropped stale query vectors");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Failed to reconcile query index with cache entries");
                0
            }
        }
    }

    fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        query_index: Arc<dyn VectorIndex>,
        settings: CacheSettings,
        snapshot_path: Option<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DomainError> {
        settings.validate()?;

        if embedder.dimensions() != query_index.dimension() {
            return Err(DomainError::configuration(format!(
                "Embedding dimensions ({}) differ from query index dimension ({})",
                embedder.dimensions(),
                query_index.dimension()
            )));
        }

        Ok(Self {
            embedder,
            query_index,
            clock,
            snapshot_path,
            settings: RwLock::new(settings),
            state: RwLock::new(CacheState::default()),
            snapshot_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn query_index(&self) -> &Arc<dyn VectorIndex> {
        &self.query_index
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub async fn settings(&self) -> CacheSettings {
        self.settings.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look a query up by exact hash, then by embedding similarity
    ///
    /// `similarity_threshold` overrides each candidate's stored threshold.
    pub async fn get(
        &self,
        query: &str,
        similarity_threshold: Option<f32>,
    ) -> Result<Option<CacheHit>, DomainError> {
        if let Some(threshold) = similarity_threshold {
            validate_threshold(threshold)?;
        }

        let hash = query_hash(query);
        let now = self.clock.now();

        {
            let mut state = self.state.write().await;

            let expired = match state.entries.get_mut(&hash) {
                Some(entry) if !entry.is_expired(now) => {
                    entry.touch(now);
                    let hit = Self::hit(entry, HitKind::Exact, 1.0);
                    drop(state);

                    self.record_hit(LookupOutcome::Exact);
                    info!(query = log_preview(query), "Cache exact hit");
                    return Ok(Some(hit));
                }
                Some(_) => true,
                None => false,
            };

            if expired {
                state.remove(&hash);
                record_cache_expired(1);
                debug!(query_hash = %hash, "Purged expired cache entry");
            }
        }

        let embedding = self.embed(query).await?;
        let candidate_pool = self.settings.read().await.candidate_pool;

        // Stale vectors do not count against the pool; widen until enough
        // live entries were compared or the index runs out.
        let mut search_k = candidate_pool;
        let mut examined = 0;
        let mut live_checked = 0;

        loop {
            let candidates = self
                .query_index
                .search(&embedding, search_k, None)
                .await
                .inspect_err(|e| warn!(error = %e, "Query index search failed"))?;
            let exhausted = candidates.len() < search_k;

            let now = self.clock.now();
            let mut state = self.state.write().await;

            for candidate in candidates.into_iter().skip(examined) {
                examined += 1;

                let Some(candidate_hash) = candidate
                    .metadata
                    .get(QUERY_HASH_KEY)
                    .and_then(Value::as_str)
                else {
                    continue;
                };

                let Some(entry) = state.entries.get_mut(candidate_hash) else {
                    let stale = candidate_hash.to_string();
                    state.orphans.insert(stale);
                    continue;
                };

                if entry.is_expired(now) {
                    let expired = candidate_hash.to_string();
                    state.remove(&expired);
                    record_cache_expired(1);
                    continue;
                }

                let similarity = cosine_similarity(&embedding, &entry.query_embedding);
                let threshold = similarity_threshold.unwrap_or(entry.similarity_threshold);

                if similarity >= threshold {
                    entry.touch(now);
                    let hit = Self::hit(entry, HitKind::Similar, similarity);
                    drop(state);

                    self.record_hit(LookupOutcome::Similar);
                    info!(
                        query = log_preview(query),
                        matched = log_preview(&hit.matched_query),
                        similarity = similarity,
                        "Cache similarity hit"
                    );
                    return Ok(Some(hit));
                }

                live_checked += 1;
                if live_checked >= candidate_pool {
                    break;
                }
            }

            drop(state);

            if exhausted || live_checked >= candidate_pool {
                break;
            }

            search_k = search_k.saturating_mul(2);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        record_cache_lookup(LookupOutcome::Miss);
        debug!(query = log_preview(query), "Cache miss");

        Ok(None)
    }

    /// Store results for a query, replacing any entry with the same hash
    pub async fn set(
        &self,
        query: &str,
        results: Vec<Value>,
        ttl_hours: Option<u32>,
    ) -> Result<SetOutcome, DomainError> {
        let embedding = self.embed(query).await?;
        let settings = self.settings().await;
        let ttl = ttl_hours.unwrap_or(settings.default_ttl_hours);

        let entry = CacheEntry::new(
            query,
            embedding,
            results,
            ttl,
            settings.similarity_threshold,
            self.clock.now(),
        );
        let hash = entry.query_hash.clone();

        self.index_entries(std::slice::from_ref(&entry)).await;

        let evicted = {
            let mut state = self.state.write().await;
            state.orphans.remove(&hash);
            state.entries.insert(hash.clone(), entry);

            let len = state.entries.len();
            let evicted = if len > settings.max_cache_size {
                state.evict_lru(eviction_batch(len), Some(&hash))
            } else {
                0
            };

            record_cache_size(state.entries.len());
            evicted
        };

        if evicted > 0 {
            record_cache_evictions(evicted);
            info!(evicted = evicted, "LRU evicted cache entries");
        }

        let persisted = self.persist().await;

        info!(
            query = log_preview(query),
            ttl_hours = ttl,
            "Cache entry stored"
        );

        Ok(SetOutcome {
            query_hash: hash,
            evicted,
            persisted,
        })
    }

    /// Delete an entry by hash
    pub async fn remove(&self, hash: &str) -> Result<bool, DomainError> {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.remove(hash).is_some();
            record_cache_size(state.entries.len());
            removed
        };

        if removed {
            self.persist().await;
            info!(query_hash = %hash, "Cache entry removed");
        }

        Ok(removed)
    }

    /// Remove every entry and every query vector
    pub async fn clear(&self) -> Result<(), DomainError> {
        {
            let mut state = self.state.write().await;
            state.entries.clear();
            state.orphans.clear();
            record_cache_size(0);
        }

        if let Err(e) = self.query_index.clear().await {
            warn!(error = %e, "Failed to reset query index");
        }

        self.flush().await?;
        info!("Cache cleared");

        Ok(())
    }

    /// Remove all expired entries in one pass
    pub async fn cleanup_expired(&self) -> Result<usize, DomainError> {
        let now = self.clock.now();

        let removed = {
            let mut state = self.state.write().await;
            let removed = state.remove_expired(now);
            record_cache_size(state.entries.len());
            removed
        };

        if removed > 0 {
            record_cache_expired(removed);
            self.persist().await;
            info!(removed = removed, "Cleaned up expired cache entries");
        }

        Ok(removed)
    }

    /// Evict the least recently accessed tenth of the entries
    pub async fn evict_lru(&self) -> Result<usize, DomainError> {
        let evicted = {
            let mut state = self.state.write().await;
            if state.entries.is_empty() {
                return Ok(0);
            }

            let count = eviction_batch(state.entries.len());
            let evicted = state.evict_lru(count, None);
            record_cache_size(state.entries.len());
            evicted
        };

        record_cache_evictions(evicted);
        self.persist().await;
        info!(evicted = evicted, "LRU evicted cache entries");

        Ok(evicted)
    }

    /// Drop vectors of removed entries and prune old index versions
    pub async fn compact(&self, keep_versions: usize) -> Result<CompactReport, DomainError> {
        let orphans: Vec<Value> = {
            let mut state = self.state.write().await;
            let orphans = std::mem::take(&mut state.orphans);

            orphans
                .into_iter()
                .filter(|hash| !state.entries.contains_key(hash))
                .map(Value::String)
                .collect()
        };

        let orphans_removed = if orphans.is_empty() {
            0
        } else {
            self.query_index
                .delete_by_metadata(QUERY_HASH_KEY, &orphans)
                .await?
        };

        let versions_removed = self.query_index.cleanup_old_versions(keep_versions).await?;

        info!(
            orphans_removed = orphans_removed,
            versions_removed = versions_removed,
            "Compacted query index"
        );

        Ok(CompactReport {
            orphans_removed,
            versions_removed,
        })
    }

    /// Copies of all entries
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.state.read().await.entries.values().cloned().collect()
    }

    /// Copy of one entry
    pub async fn entry(&self, hash: &str) -> Option<CacheEntry> {
        self.state.read().await.entries.get(hash).cloned()
    }

    /// Add externally produced entries, embedding those without a vector
    ///
    /// Existing hashes are skipped unless `overwrite` is set. The snapshot
    /// must be written for the call to succeed.
    pub async fn insert_entries(
        &self,
        entries: Vec<CacheEntry>,
        overwrite: bool,
    ) -> Result<InsertReport, DomainError> {
        let mut report = InsertReport::default();

        let candidates: Vec<CacheEntry> = {
            let state = self.state.read().await;
            entries
                .into_iter()
                .map(|mut entry| {
                    entry.query_hash = query_hash(&entry.query_text);
                    entry
                })
                .filter(|entry| {
                    let keep = overwrite || !state.entries.contains_key(&entry.query_hash);
                    if !keep {
                        report.skipped += 1;
                    }
                    keep
                })
                .collect()
        };

        let candidates = self.ensure_embeddings(candidates, &mut report).await?;
        self.index_entries(&candidates).await;
        let max_cache_size = self.settings.read().await.max_cache_size;

        {
            let mut state = self.state.write().await;
            for entry in candidates {
                state.orphans.remove(&entry.query_hash);
                state.entries.insert(entry.query_hash.clone(), entry);
                report.inserted += 1;
            }

            let len = state.entries.len();
            if len > max_cache_size {
                let count = eviction_batch(len).max(len - max_cache_size);
                report.evicted = state.evict_lru(count, None);
            }
            record_cache_size(state.entries.len());
        }

        if report.evicted > 0 {
            record_cache_evictions(report.evicted);
            info!(evicted = report.evicted, "LRU evicted cache entries after insert");
        }

        self.flush().await?;

        Ok(report)
    }

    /// Make `entries` the complete cache contents
    pub async fn replace_entries(&self, entries: Vec<CacheEntry>) -> Result<(), DomainError> {
        {
            let mut state = self.state.write().await;
            let previous: Vec<String> = state.entries.keys().cloned().collect();
            state.entries = entries
                .into_iter()
                .map(|entry| (entry.query_hash.clone(), entry))
                .collect();

            for hash in previous {
                if !state.entries.contains_key(&hash) {
                    state.orphans.insert(hash);
                }
            }
            record_cache_size(state.entries.len());
        }

        self.flush().await
    }

    /// Apply a bounds-checked settings change
    pub async fn update_settings(
        &self,
        update: &CacheSettingsUpdate,
    ) -> Result<CacheSettings, DomainError> {
        let mut settings = self.settings.write().await;
        let updated = update.apply(&settings)?;
        *settings = updated.clone();

        info!(
            max_cache_size = updated.max_cache_size,
            default_ttl_hours = updated.default_ttl_hours,
            similarity_threshold = updated.similarity_threshold,
            "Cache settings updated"
        );

        Ok(updated)
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        let settings = self.settings().await;
        let now = self.clock.now();

        let (total, expired, access_sum) = {
            let state = self.state.read().await;
            let expired = state.entries.values().filter(|e| e.is_expired(now)).count();
            let access_sum: u64 = state.entries.values().map(|e| e.access_count).sum();
            (state.entries.len(), expired, access_sum)
        };

        let query_index = match self.query_index.get_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read query index stats");
                None
            }
        };

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
            max_cache_size: settings.max_cache_size,
            usage_percent: total as f64 / settings.max_cache_size as f64 * 100.0,
            average_access_count: if total == 0 {
                0.0
            } else {
                access_sum as f64 / total as f64
            },
            similarity_threshold: settings.similarity_threshold,
            default_ttl_hours: settings.default_ttl_hours,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            query_index,
        }
    }

    /// Write the snapshot, surfacing failures
    pub async fn flush(&self) -> Result<(), DomainError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let _guard = self.snapshot_lock.lock().await;
        let entries = self.entries().await;
        let count = entries.len();

        CacheSnapshot::new(entries, self.clock.now())
            .write(path)
            .await?;

        debug!(path = %path.display(), entries = count, "Cache snapshot written");
        Ok(())
    }

    /// Write the snapshot, logging failures; in-memory state stays authoritative
    async fn persist(&self) -> bool {
        match self.flush().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to save cache snapshot");
                false
            }
        }
    }

    async fn embed(&self, query: &str) -> Result<Vector, DomainError> {
        self.embedder.encode_one(query).await.inspect_err(|e| {
            warn!(
                query = log_preview(query),
                provider = self.embedder.provider_name(),
                error = %e,
                "Failed to embed cache query"
            )
        })
    }

    async fn ensure_embeddings(
        &self,
        mut entries: Vec<CacheEntry>,
        report: &mut InsertReport,
    ) -> Result<Vec<CacheEntry>, DomainError> {
        let missing: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.query_embedding.len() != self.embedder.dimensions())
            .map(|(i, _)| i)
            .collect();

        if missing.is_empty() {
            return Ok(entries);
        }

        let texts: Vec<String> = missing
            .iter()
            .map(|&i| entries[i].query_text.clone())
            .collect();
        let vectors = self.embedder.encode(&texts).await?;

        if vectors.len() != missing.len() {
            return Err(DomainError::provider(
                self.embedder.provider_name(),
                format!(
                    "Expected {} embeddings, received {}",
                    missing.len(),
                    vectors.len()
                ),
            ));
        }

        for (i, vector) in missing.into_iter().zip(vectors) {
            entries[i].query_embedding = vector;
            report.re_embedded += 1;
        }

        Ok(entries)
    }

    /// Add query vectors for entries; failures only degrade similarity hits
    async fn index_entries(&self, entries: &[CacheEntry]) {
        if entries.is_empty() {
            return;
        }

        let vectors = entries.iter().map(|e| e.query_embedding.clone()).collect();
        let texts = entries.iter().map(|e| e.query_text.clone()).collect();
        let metas = entries
            .iter()
            .map(|e| {
                let mut meta = Metadata::new();
                meta.insert(QUERY_HASH_KEY.to_string(), e.query_hash.clone().into());
                meta.insert("query_text".to_string(), e.query_text.clone().into());
                meta
            })
            .collect();

        match self.query_index.add(vectors, texts, metas).await {
            Ok(outcome) if !outcome.persisted => {
                warn!("Query index is ahead of its persisted files");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to add query vectors"),
        }
    }

    fn hit(entry: &CacheEntry, kind: HitKind, similarity: f32) -> CacheHit {
        CacheHit {
            results: entry.results.clone(),
            kind,
            similarity,
            matched_query: entry.query_text.clone(),
            query_hash: entry.query_hash.clone(),
            access_count: entry.access_count,
        }
    }

    fn record_hit(&self, outcome: LookupOutcome) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        record_cache_lookup(outcome);
    }
}
