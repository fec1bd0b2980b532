//! Semantic cache infrastructure

mod cache;
mod snapshot;

pub use cache::{CompactReport, InsertReport, SemanticCache, SetOutcome, QUERY_HASH_KEY};
pub use snapshot::{CacheSnapshot, CACHE_FILE};
