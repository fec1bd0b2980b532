//! pgvector-backed vector index

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::flat::text_hash;
use super::snapshot::write_atomic;
use crate::domain::embedding::{ensure_dimension, normalized, Vector};
use crate::domain::vector_index::{
    validate_add_inputs, AddOutcome, IndexStats, Metadata, MetadataFilter, SearchHit,
    VectorBackend, VectorIndex,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_index_search, record_vectors_added};

/// File written inside a backup directory
pub const BACKUP_FILE: &str = "pgvector_backup.json";

static TABLE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// Configuration for the pgvector index
#[derive(Debug, Clone)]
pub struct PgvectorConfig {
    /// Embedding dimensions
    pub dimension: usize,
    /// Table name for storing vectors
    pub table_name: String,
    /// Candidate multiplier for filtered searches
    pub filter_widening: usize,
    pub max_connections: u32,
}

impl PgvectorConfig {
    /// Create a new pgvector configuration
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table_name: "rag_vectors".to_string(),
            filter_widening: 4,
            max_connections: 5,
        }
    }

    /// Set the table name
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn with_filter_widening(mut self, widening: usize) -> Self {
        self.filter_widening = widening.max(1);
        self
    }

    /// Table names are interpolated into SQL, so only plain identifiers pass
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.dimension == 0 {
            return Err(DomainError::configuration(
                "Vector dimension must be greater than 0",
            ));
        }

        if !TABLE_NAME_PATTERN.is_match(&self.table_name) {
            return Err(DomainError::configuration(format!(
                "Invalid pgvector table name '{}'",
                self.table_name
            )));
        }

        Ok(())
    }
}

/// A table row as written to a backup file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupRow {
    id: String,
    content: String,
    content_hash: String,
    embedding: Vector,
    metadata: Value,
    created_at: DateTime<Utc>,
}

/// pgvector-based vector index
pub struct PgvectorIndex {
    pool: PgPool,
    config: PgvectorConfig,
}

impl Debug for PgvectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgvectorIndex")
            .field("config", &self.config)
            .finish()
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::vector_index(format!("{}: {}", context, e))
}

impl PgvectorIndex {
    /// Create an index over an existing pool
    pub fn new(pool: PgPool, config: PgvectorConfig) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    /// Connect to `dsn` and make sure the table exists
    pub async fn connect(dsn: &str, config: PgvectorConfig) -> Result<Self, DomainError> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(dsn)
            .await
            .map_err(|e| DomainError::configuration(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let index = Self::new(pool, config)?;
        index.ensure_table().await?;

        Ok(index)
    }

    fn table(&self) -> &str {
        &self.config.table_name
    }

    /// Ensure the vector table exists with pgvector extension
    pub async fn ensure_table(&self) -> Result<(), DomainError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to create vector extension"))?;

        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                embedding vector({}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table(),
            self.config.dimension
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to create table"))?;

        self.create_ann_index().await;

        Ok(())
    }

    /// Create the ivfflat index; false when it could not be built
    ///
    /// IVFFlat needs rows to build, so a failure is logged and searches fall
    /// back to sequential scans.
    async fn create_ann_index(&self) -> bool {
        let vector_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_embedding ON {} USING ivfflat (embedding vector_cosine_ops)",
            self.table(),
            self.table()
        );

        match sqlx::query(&vector_index).execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    table = %self.table(),
                    error = %e,
                    "Failed to create ivfflat index, searches will scan sequentially"
                );
                false
            }
        }
    }

    async fn insert_rows(&self, rows: Vec<BackupRow>) -> Result<(Vec<String>, usize), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to start transaction"))?;

        let query = format!(
            r#"
            INSERT INTO {} (id, content, content_hash, embedding, metadata, created_at)
            VALUES ($1, $2, $3, $4::vector, $5, $6)
            ON CONFLICT (content_hash) DO NOTHING
            "#,
            self.table()
        );

        let mut ids = Vec::new();
        let mut skipped = 0;

        for row in rows {
            let result = sqlx::query(&query)
                .bind(&row.id)
                .bind(&row.content)
                .bind(&row.content_hash)
                .bind(embedding_to_pgvector(&row.embedding))
                .bind(&row.metadata)
                .bind(row.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to insert vector"))?;

            if result.rows_affected() == 0 {
                skipped += 1;
            } else {
                ids.push(row.id);
            }
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit vectors"))?;

        Ok((ids, skipped))
    }
}

/// Render a vector as a pgvector literal
fn embedding_to_pgvector(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

fn parse_pgvector(s: &str) -> Result<Vector, DomainError> {
    let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vector, _>>()
        .map_err(|e| DomainError::vector_index(format!("Failed to parse vector: {}", e)))
}

/// Cosine distance from `<=>` to similarity
fn distance_to_similarity(distance: f64) -> f32 {
    ((1.0 - distance) as f32).clamp(-1.0, 1.0)
}

#[async_trait]
impl VectorIndex for PgvectorIndex {
    fn backend(&self) -> VectorBackend {
        VectorBackend::Pgvector
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn add(
        &self,
        vectors: Vec<Vector>,
        texts: Vec<String>,
        metas: Vec<Metadata>,
    ) -> Result<AddOutcome, DomainError> {
        validate_add_inputs(&vectors, &texts, &metas, self.config.dimension)?;

        if vectors.is_empty() {
            return Ok(AddOutcome {
                persisted: true,
                ..Default::default()
            });
        }

        let now = Utc::now();
        let rows: Vec<BackupRow> = vectors
            .into_iter()
            .zip(texts)
            .zip(metas)
            .map(|((vector, text), metadata)| BackupRow {
                id: Uuid::new_v4().to_string(),
                content_hash: text_hash(&text),
                content: text,
                embedding: normalized(&vector),
                metadata: serde_json::to_value(metadata).unwrap_or_default(),
                created_at: now,
            })
            .collect();

        let (ids, skipped) = self.insert_rows(rows).await?;

        record_vectors_added(self.backend().as_str(), ids.len());
        info!(
            table = self.table(),
            added = ids.len(),
            skipped = skipped,
            "Added vectors to pgvector index"
        );

        Ok(AddOutcome {
            added: ids.len(),
            ids,
            skipped,
            persisted: true,
        })
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, DomainError> {
        ensure_dimension(query, self.config.dimension)?;
        record_index_search(self.backend().as_str());

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = embedding_to_pgvector(&normalized(query));
        let filter = filter.filter(|f| !f.is_empty());

        let rows = match filter {
            Some(filter) => {
                let query = format!(
                    r#"
                    SELECT id, content, metadata, distance FROM (
                        SELECT id, content, metadata, embedding <=> $1::vector AS distance
                        FROM {}
                        ORDER BY distance
                        LIMIT $2
                    ) candidates
                    WHERE metadata @> $3
                    ORDER BY distance
                    LIMIT $4
                    "#,
                    self.table()
                );

                sqlx::query(&query)
                    .bind(&embedding)
                    .bind(top_k.saturating_mul(self.config.filter_widening) as i64)
                    .bind(filter.to_json())
                    .bind(top_k as i64)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let query = format!(
                    r#"
                    SELECT id, content, metadata, embedding <=> $1::vector AS distance
                    FROM {}
                    ORDER BY distance
                    LIMIT $2
                    "#,
                    self.table()
                );

                sqlx::query(&query)
                    .bind(&embedding)
                    .bind(top_k as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_error("Search failed"))?;

        let hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|row| {
                let metadata: Value = row.get("metadata");
                let distance: f64 = row.get("distance");

                SearchHit {
                    id: row.get("id"),
                    text: row.get("content"),
                    metadata: serde_json::from_value(metadata).unwrap_or_default(),
                    score: distance_to_similarity(distance),
                }
            })
            .collect();

        debug!(
            table = self.table(),
            top_k = top_k,
            has_filter = filter.is_some(),
            results = hits.len(),
            "pgvector search completed"
        );

        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<bool, DomainError> {
        if ids.is_empty() {
            return Ok(false);
        }

        let query = format!("DELETE FROM {} WHERE id = ANY($1)", self.table());
        let result = sqlx::query(&query)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(db_error("Delete failed"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_metadata(
        &self,
        key: &str,
        values: &[Value],
    ) -> Result<usize, DomainError> {
        if values.is_empty() {
            return Ok(0);
        }

        let query = format!(
            "DELETE FROM {} WHERE metadata -> $1 IN (SELECT jsonb_array_elements($2::jsonb))",
            self.table()
        );
        let result = sqlx::query(&query)
            .bind(key)
            .bind(Value::Array(values.to_vec()))
            .execute(&self.pool)
            .await
            .map_err(db_error("Delete by metadata failed"))?;

        Ok(result.rows_affected() as usize)
    }

    async fn retain_by_metadata(&self, key: &str, keep: &[Value]) -> Result<usize, DomainError> {
        let query = format!(
            "DELETE FROM {} WHERE metadata ? $1 AND metadata -> $1 NOT IN (SELECT jsonb_array_elements($2::jsonb))",
            self.table()
        );
        let result = sqlx::query(&query)
            .bind(key)
            .bind(Value::Array(keep.to_vec()))
            .execute(&self.pool)
            .await
            .map_err(db_error("Retain by metadata failed"))?;

        Ok(result.rows_affected() as usize)
    }

    async fn update_metadata(&self, id: &str, patch: Metadata) -> Result<bool, DomainError> {
        let query = format!(
            "UPDATE {} SET metadata = metadata || $2 WHERE id = $1",
            self.table()
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(serde_json::to_value(patch)?)
            .execute(&self.pool)
            .await
            .map_err(db_error("Metadata update failed"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_stats(&self) -> Result<IndexStats, DomainError> {
        let query = format!(
            "SELECT COUNT(*) AS total, pg_total_relation_size('{}') AS size FROM {}",
            self.table(),
            self.table()
        );
        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to read stats"))?;

        let total: i64 = row.get("total");
        let size: i64 = row.get("size");

        Ok(IndexStats {
            total_vectors: total as usize,
            dimension: self.config.dimension,
            backend: self.backend(),
            size_bytes: size.max(0) as u64,
            version: None,
        })
    }

    async fn clear(&self) -> Result<(), DomainError> {
        sqlx::query(&format!("DELETE FROM {}", self.table()))
            .execute(&self.pool)
            .await
            .map_err(db_error("Clear failed"))?;

        info!(table = self.table(), "Cleared pgvector index");
        Ok(())
    }

    async fn backup(&self, path: &Path) -> Result<bool, DomainError> {
        let query = format!(
            "SELECT id, content, content_hash, embedding::text AS embedding, metadata, created_at FROM {} ORDER BY created_at",
            self.table()
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Backup query failed"))?;

        let mut backup = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: String = row.get("embedding");
            backup.push(BackupRow {
                id: row.get("id"),
                content: row.get("content"),
                content_hash: row.get("content_hash"),
                embedding: parse_pgvector(&embedding)?,
                metadata: row.get("metadata"),
                created_at: row.get("created_at"),
            });
        }

        tokio::fs::create_dir_all(path).await?;
        write_atomic(&path.join(BACKUP_FILE), &serde_json::to_vec(&backup)?).await?;

        info!(
            table = self.table(),
            backup_path = %path.display(),
            rows = backup.len(),
            "pgvector index backed up"
        );

        Ok(true)
    }

    async fn restore(&self, path: &Path) -> Result<(), DomainError> {
        let file = path.join(BACKUP_FILE);
        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::not_found(format!(
                    "No index backup found in {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let rows: Vec<BackupRow> = serde_json::from_slice(&bytes)?;
        for row in &rows {
            ensure_dimension(&row.embedding, self.config.dimension)?;
        }

        self.clear().await?;
        let (ids, _) = self.insert_rows(rows).await?;

        info!(table = self.table(), rows = ids.len(), "pgvector index restored");
        Ok(())
    }

    async fn cleanup_old_versions(&self, _keep: usize) -> Result<usize, DomainError> {
        // Versions only exist for file snapshots
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(PgvectorConfig::new(384).validate().is_ok());
        assert!(PgvectorConfig::new(0).validate().is_err());
        assert!(PgvectorConfig::new(384)
            .with_table_name("vectors; DROP TABLE users")
            .validate()
            .is_err());
        assert!(PgvectorConfig::new(384)
            .with_table_name("rag_query_vectors")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_embedding_literal_round_trip() {
        let literal = embedding_to_pgvector(&[0.5, -1.0, 2.25]);
        assert_eq!(literal, "[0.5,-1,2.25]");
        assert_eq!(parse_pgvector(&literal).unwrap(), vec![0.5, -1.0, 2.25]);
        assert!(parse_pgvector("[]").unwrap().is_empty());
        assert!(parse_pgvector("[a,b]").is_err());
    }

    #[test]
    fn test_distance_to_similarity() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((distance_to_similarity(1.0)).abs() < f32::EPSILON);
        assert!((distance_to_similarity(2.0) + 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_ann_index_failure_is_reported() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://127.0.0.1:1/unused")
            .unwrap();
        let index = PgvectorIndex::new(pool, PgvectorConfig::new(3)).unwrap();

        assert!(!index.create_ann_index().await);
    }

    #[tokio::test]
    async fn test_dimension_checked_before_query() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let index = PgvectorIndex::new(pool, PgvectorConfig::new(3)).unwrap();

        let result = index.search(&[1.0, 0.0], 1, None).await;
        assert!(matches!(result, Err(DomainError::DimensionMismatch { .. })));

        let result = index
            .add(vec![vec![1.0]], vec!["x".to_string()], vec![Metadata::new()])
            .await;
        assert!(matches!(result, Err(DomainError::DimensionMismatch { .. })));
    }
}
