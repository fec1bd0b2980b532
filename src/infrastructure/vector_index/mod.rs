//! Vector index implementations

mod factory;
mod flat;
mod pgvector;
mod snapshot;

pub use factory::{VectorIndexFactory, QUERY_INDEX_FILE, QUERY_META_FILE};
pub use flat::{text_hash, FlatIndexPaths, FlatVectorIndex};
pub use pgvector::{PgvectorConfig, PgvectorIndex};
pub use snapshot::{write_atomic, BACKUP_INDEX_FILE, BACKUP_META_FILE};
