//! Prometheus metrics infrastructure

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::config::MetricsConfig;
use crate::domain::DomainError;

/// Outcome label of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Exact,
    Similar,
    Miss,
}

impl LookupOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Similar => "similar",
            Self::Miss => "miss",
        }
    }
}

/// Install the Prometheus recorder with its own HTTP listener
///
/// Returns `Ok(false)` when metrics are disabled.
pub fn init_metrics(config: &MetricsConfig) -> Result<bool, DomainError> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return Ok(false);
    }

    let addr: SocketAddr = config.listen_addr.parse().map_err(|e| {
        DomainError::configuration(format!(
            "Invalid metrics listen address '{}': {}",
            config.listen_addr, e
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            DomainError::configuration(format!("Failed to install Prometheus exporter: {}", e))
        })?;

    gauge!("rag_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::info!(listen_addr = %addr, "Prometheus metrics initialized");

    Ok(true)
}

/// Record a semantic cache lookup
pub fn record_cache_lookup(outcome: LookupOutcome) {
    counter!("rag_cache_lookups_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record entries removed by LRU eviction
pub fn record_cache_evictions(count: usize) {
    counter!("rag_cache_evictions_total").increment(count as u64);
}

/// Record entries removed because their TTL ran out
pub fn record_cache_expired(count: usize) {
    counter!("rag_cache_expired_total").increment(count as u64);
}

/// Record the current number of cache entries
pub fn record_cache_size(entries: usize) {
    gauge!("rag_cache_entries").set(entries as f64);
}

/// Record vectors inserted into an index
pub fn record_vectors_added(backend: &'static str, count: usize) {
    counter!("rag_index_vectors_added_total", "backend" => backend).increment(count as u64);
}

/// Record a nearest-neighbour search
pub fn record_index_search(backend: &'static str) {
    counter!("rag_index_searches_total", "backend" => backend).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_are_not_installed() {
        let config = MetricsConfig::default();
        assert!(!init_metrics(&config).unwrap());
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = MetricsConfig {
            enabled: true,
            listen_addr: "not-an-address".to_string(),
        };

        assert!(matches!(
            init_metrics(&config),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_lookup(LookupOutcome::Miss);
        record_cache_evictions(3);
        record_vectors_added("flat", 2);
        record_index_search("flat");
    }
}
