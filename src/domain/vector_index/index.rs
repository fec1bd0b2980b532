//! Vector index trait definition

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::path::Path;

use super::{AddOutcome, IndexStats, Metadata, MetadataFilter, SearchHit, VectorBackend};
use crate::domain::embedding::Vector;
use crate::domain::DomainError;

/// Nearest-neighbour store over fixed-dimension vectors
///
/// Vectors are L2-normalized on insert and on query, so scores are cosine
/// similarities. Every vector passed in must have `dimension()` elements.
#[async_trait]
pub trait VectorIndex: Send + Sync + Debug {
    /// Get the backend type
    fn backend(&self) -> VectorBackend;

    /// Get the fixed vector dimension
    fn dimension(&self) -> usize;

    /// Append records, skipping texts that are already indexed
    ///
    /// All three inputs must have the same length. Nothing is inserted when
    /// any vector has the wrong dimension.
    async fn add(
        &self,
        vectors: Vec<Vector>,
        texts: Vec<String>,
        metas: Vec<Metadata>,
    ) -> Result<AddOutcome, DomainError>;

    /// Return at most `top_k` records by descending similarity
    ///
    /// With a filter, the nearest-neighbour pass runs over a widened
    /// candidate set and non-matching records are dropped afterwards.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, DomainError>;

    /// Remove records by id; true when anything was removed
    async fn delete(&self, ids: &[String]) -> Result<bool, DomainError>;

    /// Remove every record whose metadata `key` equals one of `values`
    async fn delete_by_metadata(&self, key: &str, values: &[Value])
        -> Result<usize, DomainError>;

    /// Remove every record carrying metadata `key` whose value is not in `keep`
    ///
    /// Records without `key` are left alone.
    async fn retain_by_metadata(&self, key: &str, keep: &[Value])
        -> Result<usize, DomainError>;

    /// Merge `patch` into a record's metadata; false when the id is unknown
    async fn update_metadata(&self, id: &str, patch: Metadata) -> Result<bool, DomainError>;

    /// Get index statistics
    async fn get_stats(&self) -> Result<IndexStats, DomainError>;

    /// Remove all records
    async fn clear(&self) -> Result<(), DomainError>;

    /// Write a full copy of the index under `path`
    async fn backup(&self, path: &Path) -> Result<bool, DomainError>;

    /// Replace the index contents with a backup taken by `backup`
    async fn restore(&self, path: &Path) -> Result<(), DomainError>;

    /// Delete all but the newest `keep` persisted versions
    async fn cleanup_old_versions(&self, keep: usize) -> Result<usize, DomainError>;
}

/// Check that the three `add` inputs line up
pub fn validate_add_inputs(
    vectors: &[Vector],
    texts: &[String],
    metas: &[Metadata],
    dimension: usize,
) -> Result<(), DomainError> {
    if vectors.len() != texts.len() || texts.len() != metas.len() {
        return Err(DomainError::validation(format!(
            "Input lengths differ: {} vectors, {} texts, {} metadata entries",
            vectors.len(),
            texts.len(),
            metas.len()
        )));
    }

    for vector in vectors {
        crate::domain::embedding::ensure_dimension(vector, dimension)?;
    }

    Ok(())
}
