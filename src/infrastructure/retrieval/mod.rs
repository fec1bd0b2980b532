//! Retrieval post-processing infrastructure

pub mod chunkers;
mod factory;
mod fetcher;
mod post_processor;
mod tokens;

pub use chunkers::{MixedChunker, ParagraphChunker, SentenceChunker, TokenChunker};
pub use factory::ChunkerFactory;
pub use fetcher::StaticDocumentFetcher;
pub use post_processor::{ProcessedContext, RetrievalPostProcessor, CONTEXT_SEPARATOR};
pub use tokens::TokenEstimatorFactory;

#[cfg(feature = "tiktoken")]
pub use tokens::TiktokenEstimator;
