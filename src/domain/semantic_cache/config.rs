//! Semantic cache configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Runtime-tunable cache parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of entries before LRU eviction kicks in
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// TTL applied when `set` is called without one
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u32,

    /// Cosine similarity required for a similarity hit (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Nearest cached queries examined per similarity lookup
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
}

fn default_max_cache_size() -> usize {
    1000
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_candidate_pool() -> usize {
    5
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            default_ttl_hours: default_ttl_hours(),
            similarity_threshold: default_similarity_threshold(),
            candidate_pool: default_candidate_pool(),
        }
    }
}

impl CacheSettings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_cache_size(mut self, max: usize) -> Self {
        self.max_cache_size = max;
        self
    }

    pub fn with_default_ttl_hours(mut self, hours: u32) -> Self {
        self.default_ttl_hours = hours;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_candidate_pool(mut self, pool: usize) -> Self {
        self.candidate_pool = pool;
        self
    }

    /// Get the default TTL as a Duration
    pub fn default_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.default_ttl_hours))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_cache_size == 0 {
            return Err(DomainError::configuration(
                "max_cache_size must be greater than 0",
            ));
        }

        validate_threshold(self.similarity_threshold)?;

        if self.candidate_pool == 0 {
            return Err(DomainError::configuration(
                "candidate_pool must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Partial update of the runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSettingsUpdate {
    pub max_cache_size: Option<usize>,
    pub default_ttl_hours: Option<u32>,
    pub similarity_threshold: Option<f32>,
}

impl CacheSettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.max_cache_size.is_none()
            && self.default_ttl_hours.is_none()
            && self.similarity_threshold.is_none()
    }

    /// Apply to `settings`, rejecting out-of-range values
    pub fn apply(&self, settings: &CacheSettings) -> Result<CacheSettings, DomainError> {
        let mut updated = settings.clone();

        if let Some(max) = self.max_cache_size {
            updated.max_cache_size = max;
        }

        if let Some(hours) = self.default_ttl_hours {
            if hours == 0 {
                return Err(DomainError::validation("default_ttl_hours must be at least 1"));
            }
            updated.default_ttl_hours = hours;
        }

        if let Some(threshold) = self.similarity_threshold {
            updated.similarity_threshold = threshold;
        }

        updated.validate()?;
        Ok(updated)
    }
}

/// Similarity thresholds must be positive and at most 1.0
pub fn validate_threshold(threshold: f32) -> Result<(), DomainError> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(DomainError::configuration(format!(
            "Similarity threshold must be in (0.0, 1.0], got {}",
            threshold
        )));
    }

    Ok(())
}
