//! BM25 lexical reranking

use serde::Serialize;
use std::collections::HashMap;

use super::tokenize::tokenize;

/// Okapi BM25 parameters
#[derive(Debug, Clone, Copy)]
pub struct Bm25 {
    k1: f64,
    b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// A candidate position with its relevance score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub index: usize,
    pub score: f64,
}

impl Bm25 {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    /// Score every candidate against the query
    ///
    /// Returns `None` when there is nothing to rank on, in which case callers
    /// keep the original order.
    pub fn score<T: AsRef<str>>(&self, query: &str, candidates: &[T]) -> Option<Vec<f64>> {
        let query_terms = tokenize(query);
        let docs: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(c.as_ref())).collect();

        let total_len: usize = docs.iter().map(Vec::len).sum();
        if query_terms.is_empty() || total_len == 0 {
            return None;
        }

        let n = docs.len() as f64;
        let avg_len = total_len as f64 / n;

        let frequencies: Vec<HashMap<&str, usize>> = docs
            .iter()
            .map(|doc| {
                let mut tf = HashMap::new();
                for term in doc {
                    *tf.entry(term.as_str()).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for tf in &frequencies {
            for term in tf.keys() {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let scores = frequencies
            .iter()
            .zip(docs.iter())
            .map(|(tf, doc)| {
                let len_norm = 1.0 - self.b + self.b * doc.len() as f64 / avg_len;

                query_terms
                    .iter()
                    .map(|term| {
                        let f = *tf.get(term.as_str()).unwrap_or(&0) as f64;
                        if f == 0.0 {
                            return 0.0;
                        }

                        let df = *document_frequency.get(term.as_str()).unwrap_or(&0) as f64;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

                        idf * f * (self.k1 + 1.0) / (f + self.k1 * len_norm)
                    })
                    .sum()
            })
            .collect();

        Some(scores)
    }

    /// Return the best `top_k` candidates, highest score first
    ///
    /// Ties keep input order. Without usable terms the original order is
    /// returned with zero scores.
    pub fn rerank<T: AsRef<str>>(
        &self,
        query: &str,
        candidates: &[T],
        top_k: usize,
    ) -> Vec<RankedCandidate> {
        let Some(scores) = self.score(query, candidates) else {
            tracing::debug!(
                candidates = candidates.len(),
                "No rankable terms, keeping original order"
            );

            return (0..candidates.len().min(top_k))
                .map(|index| RankedCandidate { index, score: 0.0 })
                .collect();
        };

        let mut ranked: Vec<RankedCandidate> = scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| RankedCandidate { index, score })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);
        ranked
    }
}
