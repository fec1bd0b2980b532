//! Paragraph-based chunking strategy

use std::sync::Arc;

use super::{pack_spans, paragraph_spans, sentence_spans, to_chunks};
use crate::domain::retrieval::{validate_max_tokens, Chunk, ChunkingStrategy, TokenEstimator};
use crate::domain::DomainError;

/// Chunking strategy that packs paragraphs separated by blank lines
///
/// A paragraph over the budget is re-chunked by sentences.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    estimator: Arc<dyn TokenEstimator>,
}

impl ParagraphChunker {
    /// Create a new paragraph chunker
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }
}

impl ChunkingStrategy for ParagraphChunker {
    fn chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<Chunk>, DomainError> {
        validate_max_tokens(max_tokens)?;

        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let estimator = self.estimator.as_ref();
        let by_sentence = |span| {
            pack_spans(
                text,
                sentence_spans(text, span),
                max_tokens,
                estimator,
                &|sentence| vec![sentence],
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
        "paragraph"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::assert_lossless_and_bounded;
    use super::*;
    use crate::domain::retrieval::HeuristicTokenEstimator;

    fn chunker() -> ParagraphChunker {
        ParagraphChunker::new(Arc::new(HeuristicTokenEstimator))
    }

    #[test]
    fn test_small_paragraphs_are_packed() {
        let content = "One two.\n\nThree four.\n\nFive six.";

        let chunks = chunker().chunk(content, 100).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
    }

    #[test]
    fn test_paragraph_boundaries_preserved() {
        let content = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta.\n\nIota kappa lambda mu.";

        let chunks = chunker().chunk(content, 6).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Alpha beta gamma delta.\n\n");
        assert_eq!(chunks[2].text, "Iota kappa lambda mu.");
        assert_lossless_and_bounded(content, &chunks, 6, &HeuristicTokenEstimator);
    }

    #[test]
    fn test_oversized_paragraph_falls_back_to_sentences() {
        let content = "Short intro.\n\nFirst long sentence goes here. Second long sentence goes here. Third long sentence goes here.";

        let chunks = chunker().chunk(content, 8).unwrap();

        assert_eq!(chunks[0].text, "Short intro.\n\n");
        assert!(chunks.len() >= 4);
        assert_lossless_and_bounded(content, &chunks, 8, &HeuristicTokenEstimator);
    }

    #[test]
    fn test_name() {
        assert_eq!(chunker().name(), "paragraph");
    }
}
