//! Token-length chunking strategy

use std::sync::Arc;

use super::{to_chunks, token_spans};
use crate::domain::retrieval::{validate_max_tokens, Chunk, ChunkingStrategy, TokenEstimator};
use crate::domain::DomainError;

/// Chunking strategy that cuts by an estimated characters-per-token ratio
///
/// Cuts snap back to the nearest sentence end inside a short lookback window.
#[derive(Debug, Clone)]
pub struct TokenChunker {
    estimator: Arc<dyn TokenEstimator>,
}

impl TokenChunker {
    /// Create a new token chunker
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }
}

impl ChunkingStrategy for TokenChunker {
    fn chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<Chunk>, DomainError> {
        validate_max_tokens(max_tokens)?;

        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let estimator = self.estimator.as_ref();

        if estimator.count(text) <= max_tokens {
            return Ok(to_chunks(text, vec![0..text.len()], estimator));
        }

        let ranges = token_spans(text, 0..text.len(), max_tokens, estimator);

        Ok(to_chunks(text, ranges, estimator))
    }

    fn name(&self) -> &'static str {
        "token"
    }
}
