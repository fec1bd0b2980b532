//! Factory for creating chunkers

use std::sync::Arc;

use crate::domain::retrieval::{ChunkStrategyType, ChunkingStrategy, TokenEstimator};

use super::chunkers::{MixedChunker, ParagraphChunker, SentenceChunker, TokenChunker};

/// Factory for creating chunking strategies
#[derive(Debug, Default)]
pub struct ChunkerFactory;

impl ChunkerFactory {
    /// Create a chunker for the given type
    pub fn create(
        strategy: ChunkStrategyType,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Arc<dyn ChunkingStrategy> {
        match strategy {
            ChunkStrategyType::Sentence => Arc::new(SentenceChunker::new(estimator)),
            ChunkStrategyType::Paragraph => Arc::new(ParagraphChunker::new(estimator)),
            ChunkStrategyType::Token => Arc::new(TokenChunker::new(estimator)),
            ChunkStrategyType::Mixed => Arc::new(MixedChunker::new(estimator)),
        }
    }

    /// Get a list of all available chunking strategies
    pub fn available_types() -> Vec<ChunkStrategyType> {
        vec![
            ChunkStrategyType::Sentence,
            ChunkStrategyType::Paragraph,
            ChunkStrategyType::Token,
            ChunkStrategyType::Mixed,
        ]
    }
}
