//! Sentence-based chunking strategy

use std::sync::Arc;

use super::{pack_spans, sentence_spans, to_chunks};
use crate::domain::retrieval::{validate_max_tokens, Chunk, ChunkingStrategy, TokenEstimator};
use crate::domain::DomainError;

/// Chunking strategy that packs whole sentences up to the token budget
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    estimator: Arc<dyn TokenEstimator>,
}

impl SentenceChunker {
    /// Create a new sentence chunker
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }
}

impl ChunkingStrategy for SentenceChunker {
    fn chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<Chunk>, DomainError> {
        validate_max_tokens(max_tokens)?;

        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let estimator = self.estimator.as_ref();
        let ranges = pack_spans(
            text,
            sentence_spans(text, 0..text.len()),
            max_tokens,
            estimator,
            &|span| vec![span],
        );

        Ok(to_chunks(text, ranges, estimator))
    }

    fn name(&self) -> &'static str {
        "sentence"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::assert_lossless_and_bounded;
    use super::*;
    use crate::domain::retrieval::HeuristicTokenEstimator;

    fn chunker() -> SentenceChunker {
        SentenceChunker::new(Arc::new(HeuristicTokenEstimator))
    }

    #[test]
    fn test_empty_content() {
        assert!(chunker().chunk("", 10).unwrap().is_empty());
        assert!(chunker().chunk("  \n ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_single_sentence() {
        let chunks = chunker().chunk("This is a single sentence.", 100).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "This is a single sentence.");
        assert_eq!(chunks[0].approx_tokens, 7);
    }

    #[test]
    fn test_sentences_packed_to_budget() {
        let content = "First sentence here. Second sentence here. Third sentence here.";

        let chunks = chunker().chunk(content, 8).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "First sentence here. Second sentence here. ");
        assert_lossless_and_bounded(content, &chunks, 8, &HeuristicTokenEstimator);
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let content = "Tiny. This sentence has far too many words for the budget.";

        let chunks = chunker().chunk(content, 4).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Tiny. ");
        assert!(chunks[1].approx_tokens > 4);
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(chunker().chunk("text", 0).is_err());
    }

    #[test]
    fn test_name() {
        assert_eq!(chunker().name(), "sentence");
    }
}
