//! Mixed chunking strategy

use std::sync::Arc;

use super::{pack_spans, paragraph_spans, sentence_spans, to_chunks, token_spans};
use crate::domain::retrieval::{validate_max_tokens, Chunk, ChunkingStrategy, TokenEstimator};
use crate::domain::DomainError;

/// Chunking strategy that splits hierarchically
///
/// Splitting order: paragraphs -> sentences -> token-length pieces
#[derive(Debug, Clone)]
pub struct MixedChunker {
    estimator: Arc<dyn TokenEstimator>,
}

impl MixedChunker {
    /// Create a new mixed chunker
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }
}

impl ChunkingStrategy for MixedChunker {
    fn chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<Chunk>, DomainError> {
        validate_max_tokens(max_tokens)?;

        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let estimator = self.estimator.as_ref();
        let by_token = |span| token_spans(text, span, max_tokens, estimator);
        let by_sentence = |span| {
            pack_spans(
                text,
                sentence_spans(text, span),
                max_tokens,
                estimator,
                &by_token,
            )
        };

        let ranges = pack_spans(
            text,
            paragraph_spans(text),
            max_tokens,
            estimator,
            &by_sentence,
        );

        Ok(to_chunks(text, ranges, estimator))
    }

    fn name(&self) -> &'static str {
        "mixed"
    }
}
