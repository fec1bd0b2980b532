//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    init_metrics, record_cache_evictions, record_cache_expired, record_cache_lookup,
    record_cache_size, record_index_search, record_vectors_added, LookupOutcome,
};
