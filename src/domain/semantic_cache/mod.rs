//! Semantic cache domain models
//!
//! Entries are keyed by the hash of the exact query text and also matched
//! by embedding similarity against previously cached queries.

mod clock;
mod config;
mod entry;

pub use clock::{Clock, SystemClock};
pub use config::{validate_threshold, CacheSettings, CacheSettingsUpdate};
pub use entry::{query_hash, CacheEntry, CacheHit, CacheStats, HitKind};

#[cfg(test)]
pub use clock::mock::ManualClock;
