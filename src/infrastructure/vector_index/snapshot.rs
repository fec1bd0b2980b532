//! On-disk format of the flat index
//!
//! Two files per snapshot: a bincode index file holding ids and vectors and
//! a JSON sidecar holding texts and metadata. Both are written to a `.tmp`
//! path and renamed into place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::embedding::Vector;
use crate::domain::vector_index::{Metadata, VectorRecord};
use crate::domain::DomainError;

/// File names used inside a backup directory
pub const BACKUP_INDEX_FILE: &str = "index.bin";
pub const BACKUP_META_FILE: &str = "metadata.json";

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile {
    pub dimension: usize,
    pub ids: Vec<String>,
    pub vectors: Vec<Vector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub text: String,
    pub meta: Metadata,
    pub id: String,
    pub hash: String,
    pub added_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SidecarFile {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub total_vectors: usize,
    pub dimension: usize,
    pub metadata: Vec<SidecarEntry>,
}

/// Records plus the version each was added at
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<VectorRecord>,
    pub added_versions: Vec<u64>,
    pub version: u64,
}

impl Snapshot {
    pub fn encode(&self, dimension: usize) -> Result<(Vec<u8>, Vec<u8>), DomainError> {
        let index = IndexFile {
            dimension,
            ids: self.records.iter().map(|r| r.id.clone()).collect(),
            vectors: self.records.iter().map(|r| r.vector.clone()).collect(),
        };

        let sidecar = SidecarFile {
            version: self.version,
            created_at: Utc::now(),
            total_vectors: self.records.len(),
            dimension,
            metadata: self
                .records
                .iter()
                .zip(self.added_versions.iter())
                .map(|(r, version)| SidecarEntry {
                    text: r.text.clone(),
                    meta: r.metadata.clone(),
                    id: r.id.clone(),
                    hash: r.hash.clone(),
                    added_at: r.created_at,
                    version: *version,
                })
                .collect(),
        };

        let index_bytes = bincode::serde::encode_to_vec(&index, bincode::config::standard())
            .map_err(|e| DomainError::storage(format!("Failed to encode index: {}", e)))?;
        let sidecar_bytes = serde_json::to_vec_pretty(&sidecar)?;

        Ok((index_bytes, sidecar_bytes))
    }

    pub fn decode(
        index_bytes: &[u8],
        sidecar_bytes: &[u8],
        dimension: usize,
    ) -> Result<Self, DomainError> {
        let (index, _): (IndexFile, usize) =
            bincode::serde::decode_from_slice(index_bytes, bincode::config::standard())
                .map_err(|e| DomainError::storage(format!("Failed to decode index: {}", e)))?;
        let sidecar: SidecarFile = serde_json::from_slice(sidecar_bytes)?;

        if index.dimension != dimension {
            return Err(DomainError::dimension_mismatch(dimension, index.dimension));
        }

        if index.ids.len() != index.vectors.len() || index.ids.len() != sidecar.metadata.len() {
            return Err(DomainError::storage(format!(
                "Index and sidecar disagree: {} ids, {} vectors, {} metadata entries",
                index.ids.len(),
                index.vectors.len(),
                sidecar.metadata.len()
            )));
        }

        let mut records = Vec::with_capacity(index.ids.len());
        let mut added_versions = Vec::with_capacity(index.ids.len());

        for ((id, vector), entry) in index
            .ids
            .into_iter()
            .zip(index.vectors)
            .zip(sidecar.metadata)
        {
            if id != entry.id {
                return Err(DomainError::storage(format!(
                    "Index id '{}' does not match sidecar id '{}'",
                    id, entry.id
                )));
            }

            crate::domain::embedding::ensure_dimension(&vector, dimension)?;

            added_versions.push(entry.version);
            records.push(VectorRecord {
                id,
                vector,
                text: entry.text,
                metadata: entry.meta,
                hash: entry.hash,
                created_at: entry.added_at,
            });
        }

        Ok(Self {
            records,
            added_versions,
            version: sidecar.version,
        })
    }
}

/// Write bytes to `path` through a temporary file and an atomic rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DomainError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = with_suffix(path, "tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(())
}

/// `<path>.<suffix>`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// `<path>.v<N>`
pub fn versioned_path(path: &Path, version: u64) -> PathBuf {
    with_suffix(path, &format!("v{}", version))
}

/// Versions present on disk for `path`, ascending
pub async fn list_versions(path: &Path) -> Result<Vec<u64>, DomainError> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let prefix = format!("{}.v", file_name);
    let mut versions = Vec::new();

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if let Some(version) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.parse::<u64>().ok())
        {
            versions.push(version);
        }
    }

    versions.sort_unstable();
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, text: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector: vec![1.0, 0.0],
            text: text.to_string(),
            metadata: serde_json::from_value(json!({"source": "test"})).unwrap(),
            hash: format!("hash-{}", id),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_encode_decode() {
        let snapshot = Snapshot {
            records: vec![record("a", "alpha"), record("b", "beta")],
            added_versions: vec![1, 2],
            version: 2,
        };

        let (index, sidecar) = snapshot.encode(2).unwrap();
        let decoded = Snapshot::decode(&index, &sidecar, 2).unwrap();

        assert_eq!(decoded.records, snapshot.records);
        assert_eq!(decoded.added_versions, vec![1, 2]);
        assert_eq!(decoded.version, 2);

        let sidecar_json: serde_json::Value = serde_json::from_slice(&sidecar).unwrap();
        assert_eq!(sidecar_json["total_vectors"], json!(2));
        assert_eq!(sidecar_json["metadata"][1]["text"], json!("beta"));
    }

    #[test]
    fn test_decode_rejects_other_dimension() {
        let snapshot = Snapshot {
            records: vec![record("a", "alpha")],
            added_versions: vec![1],
            version: 1,
        };
        let (index, sidecar) = snapshot.encode(2).unwrap();

        assert!(matches!(
            Snapshot::decode(&index, &sidecar, 3),
            Err(DomainError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_versioned_path() {
        let path = Path::new("/data/vectors.index");
        assert_eq!(versioned_path(path, 7), PathBuf::from("/data/vectors.index.v7"));
    }

    #[tokio::test]
    async fn test_list_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.index");

        for name in ["vectors.index.v3", "vectors.index.v10", "vectors.index.tmp", "other.v1"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        assert_eq!(list_versions(&path).await.unwrap(), vec![3, 10]);
    }
}
