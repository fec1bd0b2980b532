//! Retrieval post-processing: dedup, rerank, chunking and token budgets

mod budget;
mod chunking;
mod dedup;
mod document;
mod rerank;
mod settings;
mod tokenize;
mod tokens;

pub use budget::{budget_chunks, total_tokens, truncate_to_budget};
pub use chunking::{validate_max_tokens, Chunk, ChunkStrategyType, ChunkingStrategy};
pub use dedup::{
    content_hash, deduplicate, deduplicate_text, normalize, text_similarity, DedupMethod,
    DedupReport,
};
pub use document::{DocumentFetcher, RetrievedDocument, SourceDocument};
pub use rerank::{Bm25, RankedCandidate};
pub use settings::{RetrievalPreset, RetrievalSettings};
pub use tokenize::{is_cjk, script_counts, tokenize};
pub use tokens::{HeuristicTokenEstimator, TokenEstimator};

#[cfg(test)]
pub use document::MockDocumentFetcher;
