//! Retrieval tuning parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::chunking::ChunkStrategyType;
use super::dedup::DedupMethod;
use crate::domain::DomainError;

/// Named parameter sets for common retrieval scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalPreset {
    #[default]
    Default,
    /// Deeper retrieval with larger context
    Academic,
    /// Small, fast context
    Quick,
    /// Widest retrieval and concurrency
    Comprehensive,
}

impl RetrievalPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Academic => "academic",
            Self::Quick => "quick",
            Self::Comprehensive => "comprehensive",
        }
    }

    pub fn settings(&self) -> RetrievalSettings {
        let base = RetrievalSettings::default();

        match self {
            Self::Default => base,
            Self::Academic => RetrievalSettings {
                max_retrieved_docs: 20,
                rerank_top_k: 10,
                dedup_threshold: 0.85,
                max_context_tokens: 2000,
                chunk_max_tokens: 500,
                min_relevance_score: 0.4,
                ..base
            },
            Self::Quick => RetrievalSettings {
                max_retrieved_docs: 10,
                rerank_top_k: 5,
                dedup_threshold: 0.75,
                max_context_tokens: 1000,
                chunk_max_tokens: 300,
                search_timeout_secs: 15,
                ..base
            },
            Self::Comprehensive => RetrievalSettings {
                max_retrieved_docs: 25,
                rerank_top_k: 12,
                max_context_tokens: 2500,
                chunk_max_tokens: 600,
                max_concurrent_retrievals: 5,
                min_relevance_score: 0.35,
                ..base
            },
        }
    }
}

impl fmt::Display for RetrievalPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RetrievalPreset {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "academic" => Ok(Self::Academic),
            "quick" => Ok(Self::Quick),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(DomainError::configuration(format!(
                "Unknown retrieval preset '{}'",
                other
            ))),
        }
    }
}

/// Parameters of the retrieval and post-processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates pulled from the vector index per query
    pub max_retrieved_docs: usize,
    /// Candidates kept after BM25 rerank
    pub rerank_top_k: usize,
    pub dedup_method: DedupMethod,
    /// Similarity at which two candidates count as duplicates
    pub dedup_threshold: f32,
    /// Candidates scoring below this vector similarity are dropped
    pub min_relevance_score: f32,
    pub chunk_strategy: ChunkStrategyType,
    pub chunk_max_tokens: usize,
    /// Token budget of the assembled context
    pub max_context_tokens: usize,
    pub max_concurrent_retrievals: usize,
    pub search_timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_retrieved_docs: 15,
            rerank_top_k: 8,
            dedup_method: DedupMethod::Similarity,
            dedup_threshold: 0.8,
            min_relevance_score: 0.3,
            chunk_strategy: ChunkStrategyType::Mixed,
            chunk_max_tokens: 400,
            max_context_tokens: 1500,
            max_concurrent_retrievals: 3,
            search_timeout_secs: 30,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_retrieved_docs == 0 {
            return Err(DomainError::configuration(
                "max_retrieved_docs must be greater than 0",
            ));
        }

        if self.rerank_top_k > self.max_retrieved_docs {
            return Err(DomainError::configuration(
                "rerank_top_k must not exceed max_retrieved_docs",
            ));
        }

        if !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err(DomainError::configuration(
                "dedup_threshold must be between 0.0 and 1.0",
            ));
        }

        if !(-1.0..=1.0).contains(&self.min_relevance_score) {
            return Err(DomainError::configuration(
                "min_relevance_score must be between -1.0 and 1.0",
            ));
        }

        if self.chunk_max_tokens == 0 || self.max_context_tokens == 0 {
            return Err(DomainError::configuration(
                "Token budgets must be greater than 0",
            ));
        }

        if self.max_concurrent_retrievals == 0 {
            return Err(DomainError::configuration(
                "max_concurrent_retrievals must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = RetrievalSettings::default();

        assert!(settings.validate().is_ok());
        assert_eq!(settings.chunk_strategy, ChunkStrategyType::Mixed);
        assert_eq!(settings.max_context_tokens, 1500);
    }

    #[test]
    fn test_presets_are_valid() {
        for name in ["default", "academic", "quick", "comprehensive"] {
            let preset: RetrievalPreset = name.parse().unwrap();
            assert!(preset.settings().validate().is_ok(), "preset {}", name);
        }

        assert_eq!(RetrievalPreset::Quick.settings().search_timeout_secs, 15);
        assert_eq!(
            RetrievalPreset::Comprehensive.settings().max_concurrent_retrievals,
            5
        );
    }

    #[test]
    fn test_rerank_top_k_bound() {
        let settings = RetrievalSettings {
            max_retrieved_docs: 4,
            rerank_top_k: 5,
            ..Default::default()
        };

        assert!(matches!(
            settings.validate(),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[test]
    fn test_threshold_range() {
        let settings = RetrievalSettings {
            dedup_threshold: 1.5,
            ..Default::default()
        };

        assert!(settings.validate().is_err());
    }
}
