//! Flat in-process vector index
//!
//! Exact linear scan over L2-normalized vectors. Every mutation rewrites the
//! index file and its JSON sidecar and keeps a versioned copy of both.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::snapshot::{
    list_versions, versioned_path, write_atomic, Snapshot, BACKUP_INDEX_FILE, BACKUP_META_FILE,
};
use crate::domain::embedding::{dot, ensure_dimension, normalized, Vector};
use crate::domain::vector_index::{
    validate_add_inputs, AddOutcome, IndexStats, Metadata, MetadataFilter, SearchHit,
    VectorBackend, VectorIndex, VectorRecord,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_index_search, record_vectors_added};

const DEFAULT_FILTER_WIDENING: usize = 4;

/// Paths of the two files mirroring the index
#[derive(Debug, Clone)]
pub struct FlatIndexPaths {
    pub index_path: PathBuf,
    pub meta_path: PathBuf,
}

impl FlatIndexPaths {
    pub fn new(index_path: impl Into<PathBuf>, meta_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            meta_path: meta_path.into(),
        }
    }

    /// Both files inside `dir`
    pub fn in_dir(dir: &Path, index_file: &str, meta_file: &str) -> Self {
        Self::new(dir.join(index_file), dir.join(meta_file))
    }
}

#[derive(Debug, Default)]
struct FlatState {
    snapshot: Snapshot,
    hashes: HashSet<String>,
}

impl FlatState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let hashes = snapshot.records.iter().map(|r| r.hash.clone()).collect();
        Self { snapshot, hashes }
    }

    fn rebuild_hashes(&mut self) {
        self.hashes = self.snapshot.records.iter().map(|r| r.hash.clone()).collect();
    }

    /// Keep only records accepted by `keep`; returns the number removed
    fn retain(&mut self, keep: impl Fn(&VectorRecord) -> bool) -> usize {
        let before = self.snapshot.records.len();
        let (records, versions): (Vec<_>, Vec<_>) = std::mem::take(&mut self.snapshot.records)
            .into_iter()
            .zip(std::mem::take(&mut self.snapshot.added_versions))
            .filter(|(record, _)| keep(record))
            .unzip();

        self.snapshot.records = records;
        self.snapshot.added_versions = versions;
        self.rebuild_hashes();

        before - self.snapshot.records.len()
    }
}

/// Flat vector index with optional disk persistence
#[derive(Debug)]
pub struct FlatVectorIndex {
    dimension: usize,
    paths: Option<FlatIndexPaths>,
    filter_widening: usize,
    state: RwLock<FlatState>,
    persist_lock: Mutex<()>,
}

/// SHA-256 hex digest used for content-addressed dedup
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl FlatVectorIndex {
    /// Create an index that lives only in memory
    pub fn in_memory(dimension: usize) -> Result<Self, DomainError> {
        Self::validate_dimension(dimension)?;

        Ok(Self {
            dimension,
            paths: None,
            filter_widening: DEFAULT_FILTER_WIDENING,
            state: RwLock::new(FlatState::default()),
            persist_lock: Mutex::new(()),
        })
    }

    /// Open a persisted index, loading existing files when present
    ///
    /// When the main files are missing or unreadable the newest versioned
    /// pair that decodes cleanly is loaded instead; only when none does is
    /// the index started empty. A dimension mismatch is a configuration error.
    pub async fn open(dimension: usize, paths: FlatIndexPaths) -> Result<Self, DomainError> {
        Self::validate_dimension(dimension)?;

        let state = match Self::load(&paths.index_path, &paths.meta_path, dimension).await {
            Ok(Some(snapshot)) => {
                info!(
                    index_path = %paths.index_path.display(),
                    vectors = snapshot.records.len(),
                    version = snapshot.version,
                    "Loaded flat vector index"
                );
                FlatState::from_snapshot(snapshot)
            }
            Ok(None) => match Self::load_latest_version(&paths, dimension).await {
                Some(snapshot) => Self::recovered(&paths, snapshot),
                None => {
                    info!(index_path = %paths.index_path.display(), "Created new flat vector index");
                    FlatState::default()
                }
            },
            Err(e @ DomainError::DimensionMismatch { .. }) => {
                return Err(DomainError::configuration(format!(
                    "Index at {} was built with another dimension: {}",
                    paths.index_path.display(),
                    e
                )));
            }
            Err(e) => {
                warn!(
                    index_path = %paths.index_path.display(),
                    error = %e,
                    "Failed to load flat vector index, trying versioned copies"
                );

                match Self::load_latest_version(&paths, dimension).await {
                    Some(snapshot) => Self::recovered(&paths, snapshot),
                    None => {
                        warn!(
                            index_path = %paths.index_path.display(),
                            "No readable flat index version, starting empty"
                        );
                        FlatState::default()
                    }
                }
            }
        };

        Ok(Self {
            dimension,
            paths: Some(paths),
            filter_widening: DEFAULT_FILTER_WIDENING,
            state: RwLock::new(state),
            persist_lock: Mutex::new(()),
        })
    }

    /// Set how many extra candidates a filtered search considers per result
    pub fn with_filter_widening(mut self, widening: usize) -> Self {
        self.filter_widening = widening.max(1);
        self
    }

    fn validate_dimension(dimension: usize) -> Result<(), DomainError> {
        if dimension == 0 {
            return Err(DomainError::configuration(
                "Vector dimension must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Newest versioned index and sidecar pair that decodes cleanly
    async fn load_latest_version(paths: &FlatIndexPaths, dimension: usize) -> Option<Snapshot> {
        let versions = match (
            list_versions(&paths.index_path).await,
            list_versions(&paths.meta_path).await,
        ) {
            (Ok(index_versions), Ok(meta_versions)) => {
                let meta_versions: HashSet<u64> = meta_versions.into_iter().collect();
                index_versions
                    .into_iter()
                    .filter(|v| meta_versions.contains(v))
                    .collect::<Vec<_>>()
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to list flat index versions");
                return None;
            }
        };

        for version in versions.into_iter().rev() {
            let index_path = versioned_path(&paths.index_path, version);
            let meta_path = versioned_path(&paths.meta_path, version);

            match Self::load(&index_path, &meta_path, dimension).await {
                Ok(Some(snapshot)) => return Some(snapshot),
                Ok(None) => {}
                Err(e) => warn!(
                    version = version,
                    error = %e,
                    "Skipping unreadable flat index version"
                ),
            }
        }

        None
    }

    fn recovered(paths: &FlatIndexPaths, snapshot: Snapshot) -> FlatState {
        warn!(
            index_path = %paths.index_path.display(),
            vectors = snapshot.records.len(),
            version = snapshot.version,
            "Recovered flat vector index from versioned copy"
        );
        FlatState::from_snapshot(snapshot)
    }

    async fn load(
        index_path: &Path,
        meta_path: &Path,
        dimension: usize,
    ) -> Result<Option<Snapshot>, DomainError> {
        if !tokio::fs::try_exists(index_path).await? || !tokio::fs::try_exists(meta_path).await? {
            return Ok(None);
        }

        let index_bytes = tokio::fs::read(index_path).await?;
        let meta_bytes = tokio::fs::read(meta_path).await?;

        Snapshot::decode(&index_bytes, &meta_bytes, dimension).map(Some)
    }

    /// Write the current state to disk; no-op for in-memory indexes
    ///
    /// Callers hold `persist_lock`, so snapshots reach disk in order. The
    /// versioned pair is complete before the main files are replaced, so an
    /// interrupted write always leaves a loadable version behind.
    async fn persist(&self) -> Result<(), DomainError> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };

        let (index_bytes, meta_bytes, version) = {
            let mut state = self.state.write().await;
            state.snapshot.version += 1;
            let (index_bytes, meta_bytes) = state.snapshot.encode(self.dimension)?;
            (index_bytes, meta_bytes, state.snapshot.version)
        };

        write_atomic(&versioned_path(&paths.index_path, version), &index_bytes).await?;
        write_atomic(&versioned_path(&paths.meta_path, version), &meta_bytes).await?;
        write_atomic(&paths.index_path, &index_bytes).await?;
        write_atomic(&paths.meta_path, &meta_bytes).await?;

        debug!(
            index_path = %paths.index_path.display(),
            version = version,
            "Persisted flat vector index"
        );

        Ok(())
    }

    /// Persist, downgrading failures to a warning
    async fn persist_logged(&self, operation: &str) -> bool {
        match self.persist().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    operation = operation,
                    error = %e,
                    "Failed to persist flat vector index, in-memory state kept"
                );
                false
            }
        }
    }

    async fn file_size(path: &Path) -> u64 {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// All records, in insertion order
    pub async fn records(&self) -> Vec<VectorRecord> {
        self.state.read().await.snapshot.records.clone()
    }
}

#[async_trait]
impl VectorIndex for FlatVectorIndex {
    fn backend(&self) -> VectorBackend {
        VectorBackend::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn add(
        &self,
        vectors: Vec<Vector>,
        texts: Vec<String>,
        metas: Vec<Metadata>,
    ) -> Result<AddOutcome, DomainError> {
        validate_add_inputs(&vectors, &texts, &metas, self.dimension)?;

        let _persist = self.persist_lock.lock().await;
        let mut outcome = AddOutcome::default();

        {
            let mut state = self.state.write().await;
            let version = state.snapshot.version + 1;
            let now = Utc::now();

            for ((vector, text), metadata) in vectors.into_iter().zip(texts).zip(metas) {
                let hash = text_hash(&text);

                if !state.hashes.insert(hash.clone()) {
                    outcome.skipped += 1;
                    continue;
                }

                let id = Uuid::new_v4().to_string();
                outcome.ids.push(id.clone());
                state.snapshot.added_versions.push(version);
                state.snapshot.records.push(VectorRecord {
                    id,
                    vector: normalized(&vector),
                    text,
                    metadata,
                    hash,
                    created_at: now,
                });
            }
        }

        outcome.added = outcome.ids.len();
        outcome.persisted = if outcome.added > 0 {
            self.persist_logged("add").await
        } else {
            true
        };

        record_vectors_added(self.backend().as_str(), outcome.added);
        info!(
            added = outcome.added,
            skipped = outcome.skipped,
            persisted = outcome.persisted,
            "Added vectors to flat index"
        );

        Ok(outcome)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, DomainError> {
        ensure_dimension(query, self.dimension)?;
        record_index_search(self.backend().as_str());

        let state = self.state.read().await;
        let records = &state.snapshot.records;

        if records.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        let filter = filter.filter(|f| !f.is_empty());
        let candidates = match filter {
            Some(_) => top_k.saturating_mul(self.filter_widening),
            None => top_k,
        };

        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .map(|(i, record)| (i, dot(&query, &record.vector).clamp(-1.0, 1.0)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(candidates);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(i, score)| (&records[i], score))
            .filter(|(record, _)| filter.is_none_or(|f| f.matches(&record.metadata)))
            .take(top_k)
            .map(|(record, score)| SearchHit {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect();

        debug!(
            top_k = top_k,
            candidates = candidates,
            results = hits.len(),
            "Flat index search completed"
        );

        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<bool, DomainError> {
        let _persist = self.persist_lock.lock().await;
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let removed = self
            .state
            .write()
            .await
            .retain(|record| !targets.contains(record.id.as_str()));

        if removed > 0 {
            self.persist_logged("delete").await;
            info!(removed = removed, "Deleted vectors from flat index");
        }

        Ok(removed > 0)
    }

    async fn delete_by_metadata(
        &self,
        key: &str,
        values: &[Value],
    ) -> Result<usize, DomainError> {
        if values.is_empty() {
            return Ok(0);
        }

        let _persist = self.persist_lock.lock().await;

        let removed = self.state.write().await.retain(|record| {
            record
                .metadata
                .get(key)
                .is_none_or(|value| !values.contains(value))
        });

        if removed > 0 {
            self.persist_logged("delete_by_metadata").await;
            info!(key = key, removed = removed, "Deleted vectors by metadata");
        }

        Ok(removed)
    }

    async fn retain_by_metadata(&self, key: &str, keep: &[Value]) -> Result<usize, DomainError> {
        let _persist = self.persist_lock.lock().await;

        let removed = self.state.write().await.retain(|record| {
            record
                .metadata
                .get(key)
                .is_none_or(|value| keep.contains(value))
        });

        if removed > 0 {
            self.persist_logged("retain_by_metadata").await;
            info!(key = key, removed = removed, "Dropped vectors outside the kept set");
        }

        Ok(removed)
    }

    async fn update_metadata(&self, id: &str, patch: Metadata) -> Result<bool, DomainError> {
        let _persist = self.persist_lock.lock().await;

        let updated = {
            let mut state = self.state.write().await;

            match state.snapshot.records.iter_mut().find(|r| r.id == id) {
                Some(record) => {
                    record.metadata.extend(patch);
                    true
                }
                None => false,
            }
        };

        if updated {
            self.persist_logged("update_metadata").await;
        }

        Ok(updated)
    }

    async fn get_stats(&self) -> Result<IndexStats, DomainError> {
        let (total_vectors, version) = {
            let state = self.state.read().await;
            (state.snapshot.records.len(), state.snapshot.version)
        };

        let size_bytes = match &self.paths {
            Some(paths) => {
                Self::file_size(&paths.index_path).await + Self::file_size(&paths.meta_path).await
            }
            None => (total_vectors * self.dimension * std::mem::size_of::<f32>()) as u64,
        };

        Ok(IndexStats {
            total_vectors,
            dimension: self.dimension,
            backend: self.backend(),
            size_bytes,
            version: self.paths.as_ref().map(|_| version),
        })
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let _persist = self.persist_lock.lock().await;

        {
            let mut state = self.state.write().await;
            let version = state.snapshot.version;
            *state = FlatState::default();
            state.snapshot.version = version;
        }

        self.persist().await?;
        info!("Cleared flat vector index");

        Ok(())
    }

    async fn backup(&self, path: &Path) -> Result<bool, DomainError> {
        let (index_bytes, meta_bytes) = {
            let state = self.state.read().await;
            state.snapshot.encode(self.dimension)?
        };

        tokio::fs::create_dir_all(path).await?;
        write_atomic(&path.join(BACKUP_INDEX_FILE), &index_bytes).await?;
        write_atomic(&path.join(BACKUP_META_FILE), &meta_bytes).await?;

        info!(backup_path = %path.display(), "Flat vector index backed up");

        Ok(true)
    }

    async fn restore(&self, path: &Path) -> Result<(), DomainError> {
        let snapshot = Self::load(
            &path.join(BACKUP_INDEX_FILE),
            &path.join(BACKUP_META_FILE),
            self.dimension,
        )
        .await?
        .ok_or_else(|| {
            DomainError::not_found(format!("No index backup found in {}", path.display()))
        })?;

        let _persist = self.persist_lock.lock().await;
        let restored = snapshot.records.len();

        {
            let mut state = self.state.write().await;
            let version = state.snapshot.version.max(snapshot.version);
            *state = FlatState::from_snapshot(snapshot);
            state.snapshot.version = version;
        }

        self.persist().await?;
        info!(backup_path = %path.display(), vectors = restored, "Flat vector index restored");

        Ok(())
    }

    async fn cleanup_old_versions(&self, keep: usize) -> Result<usize, DomainError> {
        let Some(paths) = &self.paths else {
            return Ok(0);
        };

        let _persist = self.persist_lock.lock().await;

        let mut versions: Vec<u64> = list_versions(&paths.index_path).await?;
        versions.extend(list_versions(&paths.meta_path).await?);
        versions.sort_unstable();
        versions.dedup();

        let stale = versions.len().saturating_sub(keep);
        let mut deleted = 0;

        for version in versions.into_iter().take(stale) {
            for path in [&paths.index_path, &paths.meta_path] {
                let file = versioned_path(path, version);

                match tokio::fs::remove_file(&file).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            deleted += 1;
        }

        if deleted > 0 {
            info!(deleted = deleted, kept = keep, "Pruned old flat index versions");
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn seeded() -> FlatVectorIndex {
        let index = FlatVectorIndex::in_memory(3).unwrap();
        index
            .add(
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.7, 0.7, 0.0]],
                texts(&["x axis", "y axis", "diagonal"]),
                vec![
                    meta(json!({"source": "a"})),
                    meta(json!({"source": "b"})),
                    meta(json!({"source": "b"})),
                ],
            )
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_round_trip_top_result() {
        let index = seeded().await;

        let hits = index.search(&[2.0, 0.0, 0.0], 1, None).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "x axis");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = seeded().await;

        let hits = index.search(&[1.0, 0.2, 0.0], 3, None).await.unwrap();

        let order: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["x axis", "diagonal", "y axis"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let index = FlatVectorIndex::in_memory(3).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let index = seeded().await;
        let filter = MetadataFilter::new().with("source", "b");

        let hits = index.search(&[1.0, 0.0, 0.0], 1, Some(&filter)).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "diagonal");
    }

    #[tokio::test]
    async fn test_dimension_guard_does_not_mutate() {
        let index = seeded().await;

        let result = index
            .add(
                vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]],
                texts(&["ok", "short"]),
                vec![Metadata::new(), Metadata::new()],
            )
            .await;

        assert!(matches!(result, Err(DomainError::DimensionMismatch { .. })));
        assert_eq!(index.get_stats().await.unwrap().total_vectors, 3);
        assert!(matches!(
            index.search(&[1.0], 1, None).await,
            Err(DomainError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_text_is_skipped() {
        let index = seeded().await;

        let outcome = index
            .add(
                vec![vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 1.0]],
                texts(&["x axis", "z axis"]),
                vec![Metadata::new(), Metadata::new()],
            )
            .await
            .unwrap();

        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(index.get_stats().await.unwrap().total_vectors, 4);
    }

    #[tokio::test]
    async fn test_delete_rebuilds_index() {
        let index = seeded().await;
        let ids: Vec<String> = index.records().await.iter().map(|r| r.id.clone()).collect();

        assert!(index.delete(&ids[..1]).await.unwrap());
        assert!(!index.delete(&ids[..1]).await.unwrap());

        let hits = index.search(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.text != "x axis"));

        // Deleted text can be added again
        let outcome = index
            .add(vec![vec![1.0, 0.0, 0.0]], texts(&["x axis"]), vec![Metadata::new()])
            .await
            .unwrap();
        assert_eq!(outcome.added, 1);
    }

    #[tokio::test]
    async fn test_delete_by_metadata_and_update() {
        let index = seeded().await;

        assert_eq!(
            index.delete_by_metadata("source", &[json!("b")]).await.unwrap(),
            2
        );

        let id = index.records().await[0].id.clone();
        assert!(index
            .update_metadata(&id, meta(json!({"reviewed": true})))
            .await
            .unwrap());
        assert!(!index.update_metadata("missing", Metadata::new()).await.unwrap());

        let record = &index.records().await[0];
        assert_eq!(record.metadata["source"], json!("a"));
        assert_eq!(record.metadata["reviewed"], json!(true));
    }

    #[tokio::test]
    async fn test_retain_by_metadata() {
        let index = seeded().await;
        index
            .add(vec![vec![0.0, 0.0, 1.0]], texts(&["untagged"]), vec![Metadata::new()])
            .await
            .unwrap();

        let removed = index
            .retain_by_metadata("source", &[json!("b")])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let remaining: Vec<String> = index.records().await.into_iter().map(|r| r.text).collect();
        assert_eq!(remaining, vec!["y axis", "diagonal", "untagged"]);

        assert_eq!(index.retain_by_metadata("source", &[]).await.unwrap(), 2);
        assert_eq!(index.get_stats().await.unwrap().total_vectors, 1);
    }

    #[tokio::test]
    async fn test_persistence_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FlatIndexPaths::in_dir(dir.path(), "vectors.index", "vectors_meta.json");

        {
            let index = FlatVectorIndex::open(3, paths.clone()).await.unwrap();
            let outcome = index
                .add(
                    vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                    texts(&["first", "second"]),
                    vec![meta(json!({"n": 1})), meta(json!({"n": 2}))],
                )
                .await
                .unwrap();
            assert!(outcome.persisted);
        }

        let reopened = FlatVectorIndex::open(3, paths.clone()).await.unwrap();
        let hits = reopened.search(&[0.0, 1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits[0].text, "second");
        assert_eq!(hits[0].metadata["n"], json!(2));

        let sidecar: Value =
            serde_json::from_slice(&std::fs::read(&paths.meta_path).unwrap()).unwrap();
        assert_eq!(sidecar["total_vectors"], json!(2));
        assert!(sidecar["metadata"][0]["hash"].is_string());

        assert!(matches!(
            FlatVectorIndex::open(4, paths).await,
            Err(DomainError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_torn_main_files_recover_from_versions() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FlatIndexPaths::in_dir(dir.path(), "vectors.index", "vectors_meta.json");

        {
            let index = FlatVectorIndex::open(3, paths.clone()).await.unwrap();
            for (i, text) in ["alpha", "beta", "gamma"].into_iter().enumerate() {
                index
                    .add(
                        vec![vec![1.0, i as f32, 0.0]],
                        texts(&[text]),
                        vec![Metadata::new()],
                    )
                    .await
                    .unwrap();
            }
        }

        // Index file at version 3, sidecar still at version 2
        std::fs::copy(versioned_path(&paths.meta_path, 2), &paths.meta_path).unwrap();

        let reopened = FlatVectorIndex::open(3, paths.clone()).await.unwrap();
        assert_eq!(reopened.get_stats().await.unwrap().total_vectors, 3);
        drop(reopened);

        // Version 3 itself only half written
        std::fs::remove_file(versioned_path(&paths.meta_path, 3)).unwrap();

        let reopened = FlatVectorIndex::open(3, paths.clone()).await.unwrap();
        assert_eq!(reopened.get_stats().await.unwrap().total_vectors, 2);

        reopened
            .add(vec![vec![0.0, 0.0, 1.0]], texts(&["delta"]), vec![Metadata::new()])
            .await
            .unwrap();
        drop(reopened);

        let reopened = FlatVectorIndex::open(3, paths).await.unwrap();
        let stored: Vec<String> = reopened.records().await.into_iter().map(|r| r.text).collect();
        assert_eq!(stored, vec!["alpha", "beta", "delta"]);
    }

    #[tokio::test]
    async fn test_versions_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FlatIndexPaths::in_dir(dir.path(), "vectors.index", "vectors_meta.json");
        let index = FlatVectorIndex::open(3, paths.clone()).await.unwrap();

        for i in 0..5 {
            index
                .add(
                    vec![vec![1.0, i as f32, 0.0]],
                    vec![format!("doc {}", i)],
                    vec![Metadata::new()],
                )
                .await
                .unwrap();
        }

        assert_eq!(list_versions(&paths.index_path).await.unwrap().len(), 5);
        assert_eq!(index.cleanup_old_versions(2).await.unwrap(), 3);
        assert_eq!(list_versions(&paths.index_path).await.unwrap(), vec![4, 5]);
        assert_eq!(list_versions(&paths.meta_path).await.unwrap(), vec![4, 5]);
        assert_eq!(index.cleanup_old_versions(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = dir.path().join("backup");
        let index = seeded().await;

        assert!(index.backup(&backup_dir).await.unwrap());
        index.clear().await.unwrap();
        assert_eq!(index.get_stats().await.unwrap().total_vectors, 0);

        index.restore(&backup_dir).await.unwrap();
        assert_eq!(index.get_stats().await.unwrap().total_vectors, 3);

        let missing = index.restore(&dir.path().join("nothing")).await;
        assert!(matches!(missing, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let index = std::sync::Arc::new(FlatVectorIndex::in_memory(2).unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let index = index.clone();
                tokio::spawn(async move {
                    index
                        .add(
                            vec![vec![1.0, i as f32]],
                            vec![format!("doc {}", i)],
                            vec![Metadata::new()],
                        )
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(index.get_stats().await.unwrap().total_vectors, 8);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            FlatVectorIndex::in_memory(0),
            Err(DomainError::Configuration { .. })
        ));
    }
}
