//! Retrieval post-processing pipeline
//!
//! Relevance filter, source dedup, content dedup, BM25 rerank, chunking and
//! token budgeting, in that order.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ChunkerFactory;
use crate::domain::retrieval::{
    budget_chunks, deduplicate, total_tokens, Bm25, Chunk, ChunkingStrategy, RetrievalSettings,
    RetrievedDocument, TokenEstimator,
};
use crate::domain::DomainError;
use crate::infrastructure::logging::log_preview;

/// Separator between chunks in the assembled context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Output of the post-processing pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedContext {
    /// Budgeted chunks joined with a blank line
    pub context: String,
    pub chunks: Vec<Chunk>,
    /// Reranked documents the chunks were cut from
    pub documents: Vec<RetrievedDocument>,
    pub total_tokens: usize,
    /// Candidates dropped as duplicates
    pub duplicates_removed: usize,
}

/// Stateless pipeline turning search hits into a bounded context
#[derive(Debug, Clone)]
pub struct RetrievalPostProcessor {
    settings: RetrievalSettings,
    estimator: Arc<dyn TokenEstimator>,
    chunker: Arc<dyn ChunkingStrategy>,
    bm25: Bm25,
}

impl RetrievalPostProcessor {
    pub fn new(
        settings: RetrievalSettings,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, DomainError> {
        settings.validate()?;

        let chunker = ChunkerFactory::create(settings.chunk_strategy, estimator.clone());

        Ok(Self {
            settings,
            estimator,
            chunker,
            bm25: Bm25::default(),
        })
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Run the whole pipeline for one query
    pub fn process(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<ProcessedContext, DomainError> {
        let candidates = documents.len();

        let relevant = self.filter_relevant(documents);
        let (unique_sources, source_duplicates) = self.dedup_sources(relevant);
        let (unique, content_duplicates) = self.dedup_content(unique_sources);
        let reranked = self.rerank(query, unique);

        let chunks = self.chunk_documents(&reranked)?;
        let budgeted = budget_chunks(
            chunks,
            self.settings.max_context_tokens,
            self.estimator.as_ref(),
        );

        let context = budgeted
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let tokens = total_tokens(&budgeted);

        debug!(
            query = log_preview(query),
            candidates = candidates,
            documents = reranked.len(),
            chunks = budgeted.len(),
            tokens = tokens,
            "Post-processed retrieval results"
        );

        Ok(ProcessedContext {
            context,
            chunks: budgeted,
            documents: reranked,
            total_tokens: tokens,
            duplicates_removed: source_duplicates + content_duplicates,
        })
    }

    /// Drop candidates below the minimum vector similarity
    pub fn filter_relevant(&self, documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        documents
            .into_iter()
            .filter(|d| d.score >= self.settings.min_relevance_score)
            .collect()
    }

    /// Keep the first document per `(url, title)`
    ///
    /// Documents without either field are never merged.
    pub fn dedup_sources(
        &self,
        documents: Vec<RetrievedDocument>,
    ) -> (Vec<RetrievedDocument>, usize) {
        let mut seen = HashSet::new();
        let before = documents.len();

        let unique: Vec<RetrievedDocument> = documents
            .into_iter()
            .filter(|doc| {
                let key = doc.source_key();
                if key.0.is_empty() && key.1.is_empty() {
                    return true;
                }
                seen.insert(key)
            })
            .collect();

        let removed = before - unique.len();
        (unique, removed)
    }

    /// Collapse clusters of near-identical texts to their first member
    pub fn dedup_content(
        &self,
        documents: Vec<RetrievedDocument>,
    ) -> (Vec<RetrievedDocument>, usize) {
        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let report = deduplicate(
            &texts,
            self.settings.dedup_method,
            self.settings.dedup_threshold,
        );

        if !report.duplicates_found() {
            return (documents, 0);
        }

        debug!(
            groups = report.duplicate_groups.len(),
            removed = report.removed(),
            "Removed duplicate documents"
        );

        (report.select(&documents), report.removed())
    }

    /// BM25 rerank, keeping `rerank_top_k` documents
    pub fn rerank(&self, query: &str, documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        let top_k = self.settings.rerank_top_k;

        if documents.len() <= 1 {
            return documents.into_iter().take(top_k).collect();
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let ranked = self.bm25.rerank(query, &texts, top_k);

        ranked
            .into_iter()
            .filter_map(|candidate| {
                let mut doc = documents.get(candidate.index)?.clone();
                doc.rerank_score = Some(candidate.score);
                doc.metadata
                    .insert("rerank_score".to_string(), candidate.score.into());
                Some(doc)
            })
            .collect()
    }

    /// Chunk every document in order with the configured strategy
    pub fn chunk_documents(
        &self,
        documents: &[RetrievedDocument],
    ) -> Result<Vec<Chunk>, DomainError> {
        let mut chunks = Vec::new();

        for doc in documents {
            chunks.extend(self.chunker.chunk(&doc.text, self.settings.chunk_max_tokens)?);
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::retrieval::{ChunkStrategyType, HeuristicTokenEstimator};
    use crate::domain::vector_index::Metadata;
    use serde_json::json;

    fn processor(settings: RetrievalSettings) -> RetrievalPostProcessor {
        RetrievalPostProcessor::new(settings, Arc::new(HeuristicTokenEstimator::new())).unwrap()
    }

    fn doc(text: &str, url: &str, score: f32) -> RetrievedDocument {
        let mut meta = Metadata::new();
        if !url.is_empty() {
            meta.insert("url".to_string(), json!(url));
        }
        RetrievedDocument::new(text, meta, score)
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = RetrievalSettings {
            chunk_max_tokens: 0,
            ..Default::default()
        };

        assert!(RetrievalPostProcessor::new(settings, Arc::new(HeuristicTokenEstimator::new()))
            .is_err());
    }

    #[test]
    fn test_filter_relevant() {
        let p = processor(RetrievalSettings::default());

        let kept = p.filter_relevant(vec![doc("a", "", 0.9), doc("b", "", 0.1)]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "a");
    }

    #[test]
    fn test_dedup_sources_keeps_first_and_unkeyed() {
        let p = processor(RetrievalSettings::default());

        let (unique, removed) = p.dedup_sources(vec![
            doc("first", "https://a", 0.9),
            doc("second", "https://a", 0.8),
            doc("third", "", 0.7),
            doc("fourth", "", 0.6),
        ]);

        assert_eq!(removed, 1);
        let texts: Vec<&str> = unique.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "third", "fourth"]);
    }

    #[test]
    fn test_rerank_sets_scores() {
        let p = processor(RetrievalSettings {
            rerank_top_k: 2,
            ..Default::default()
        });

        let reranked = p.rerank(
            "rust cache",
            vec![
                doc("gardening tips for spring", "", 0.9),
                doc("a rust cache implementation", "", 0.8),
                doc("rust ownership rules", "", 0.7),
            ],
        );

        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].text, "a rust cache implementation");
        assert!(reranked[0].rerank_score.unwrap() > reranked[1].rerank_score.unwrap());
        assert!(reranked[0].metadata.contains_key("rerank_score"));
    }

    #[test]
    fn test_process_respects_budget() {
        let p = processor(RetrievalSettings {
            chunk_strategy: ChunkStrategyType::Sentence,
            chunk_max_tokens: 20,
            max_context_tokens: 30,
            min_relevance_score: 0.0,
            ..Default::default()
        });

        let long = "Vector search finds neighbours. ".repeat(20);
        let result = p
            .process(
                "vector search",
                vec![doc(&long, "https://a", 0.9), doc("Caches store results.", "https://b", 0.8)],
            )
            .unwrap();

        assert!(!result.chunks.is_empty());
        assert!(result.total_tokens <= 30);
        assert_eq!(
            result.context,
            result
                .chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR)
        );
    }

    #[test]
    fn test_process_removes_duplicates() {
        let p = processor(RetrievalSettings {
            min_relevance_score: 0.0,
            ..Default::default()
        });

        let text = "Semantic caches return stored answers for similar questions.";
        let result = p
            .process(
                "semantic cache",
                vec![doc(text, "https://a", 0.9), doc(text, "https://b", 0.9)],
            )
            .unwrap();

        assert_eq!(result.duplicates_removed, 1);
        assert_eq!(result.documents.len(), 1);
    }

    #[test]
    fn test_process_empty_input() {
        let p = processor(RetrievalSettings::default());

        let result = p.process("anything", Vec::new()).unwrap();

        assert!(result.context.is_empty());
        assert_eq!(result.total_tokens, 0);
    }
}
