//! Content deduplication
//!
//! Documents are clustered transitively: any two documents whose similarity
//! reaches the threshold end up in the same duplicate group, and only the
//! first member of each group survives.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::TextDiff;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

use super::tokenize::tokenize;
use crate::domain::DomainError;

/// Sentences shorter than this are never treated as duplicates
const MIN_COMPARABLE_CHARS: usize = 10;

/// Upper bound on a single sequence diff
const DIFF_TIMEOUT: Duration = Duration::from_millis(200);

/// How two texts are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMethod {
    /// Equal content hash over normalized text
    Hash,
    /// Character sequence similarity ratio
    #[default]
    Similarity,
    /// Jaccard index over the character sets
    Jaccard,
    /// Word overlap relative to the shorter text
    #[serde(alias = "semantic")]
    Overlap,
}

impl DedupMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Similarity => "similarity",
            Self::Jaccard => "jaccard",
            Self::Overlap => "overlap",
        }
    }
}

impl fmt::Display for DedupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DedupMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "similarity" => Ok(Self::Similarity),
            "jaccard" => Ok(Self::Jaccard),
            "overlap" | "semantic" => Ok(Self::Overlap),
            other => Err(DomainError::configuration(format!(
                "Unknown dedup method '{}'",
                other
            ))),
        }
    }
}

/// Outcome of deduplicating a list of documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    /// Indices of the surviving documents, in input order
    pub unique_indices: Vec<usize>,
    /// Every cluster with more than one member, members sorted ascending
    pub duplicate_groups: Vec<Vec<usize>>,
}

impl DedupReport {
    pub fn duplicates_found(&self) -> bool {
        !self.duplicate_groups.is_empty()
    }

    /// Number of documents dropped
    pub fn removed(&self) -> usize {
        self.duplicate_groups.iter().map(|g| g.len() - 1).sum()
    }

    /// Pick the surviving documents out of the input list
    pub fn select<T: Clone>(&self, documents: &[T]) -> Vec<T> {
        self.unique_indices
            .iter()
            .filter_map(|&i| documents.get(i).cloned())
            .collect()
    }
}

/// Lowercase, strip punctuation and collapse whitespace
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// SHA-256 hex digest of the normalized text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Similarity of two texts in [0, 1] under the given method
pub fn text_similarity(a: &str, b: &str, method: DedupMethod) -> f32 {
    match method {
        DedupMethod::Hash => {
            if normalize(a) == normalize(b) {
                1.0
            } else {
                0.0
            }
        }
        DedupMethod::Similarity => {
            let a = a.to_lowercase();
            let b = b.to_lowercase();

            if a.is_empty() && b.is_empty() {
                return 1.0;
            }

            TextDiff::configure()
                .timeout(DIFF_TIMEOUT)
                .diff_chars(a.as_str(), b.as_str())
                .ratio()
        }
        DedupMethod::Jaccard => {
            let a = char_set(a);
            let b = char_set(b);
            let union = a.union(&b).count();

            if union == 0 {
                return 1.0;
            }

            a.intersection(&b).count() as f32 / union as f32
        }
        DedupMethod::Overlap => {
            let a: HashSet<String> = tokenize(a).into_iter().collect();
            let b: HashSet<String> = tokenize(b).into_iter().collect();
            let smaller = a.len().min(b.len());

            if smaller == 0 {
                return 0.0;
            }

            a.intersection(&b).count() as f32 / smaller as f32
        }
    }
}

fn char_set(text: &str) -> HashSet<char> {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Deduplicate a list of documents
pub fn deduplicate<T: AsRef<str>>(
    documents: &[T],
    method: DedupMethod,
    threshold: f32,
) -> DedupReport {
    let n = documents.len();
    let mut clusters = DisjointSet::new(n);

    match method {
        DedupMethod::Hash => {
            let mut first_seen: HashMap<String, usize> = HashMap::new();

            for (i, doc) in documents.iter().enumerate() {
                let hash = content_hash(doc.as_ref());

                match first_seen.get(&hash) {
                    Some(&first) => clusters.union(first, i),
                    None => {
                        first_seen.insert(hash, i);
                    }
                }
            }
        }
        _ => {
            for i in 0..n {
                for j in (i + 1)..n {
                    if clusters.find(i) == clusters.find(j) {
                        continue;
                    }

                    if text_similarity(documents[i].as_ref(), documents[j].as_ref(), method)
                        >= threshold
                    {
                        clusters.union(i, j);
                    }
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        groups.entry(clusters.find(i)).or_default().push(i);
    }

    let mut unique_indices: Vec<usize> = groups.values().map(|members| members[0]).collect();
    unique_indices.sort_unstable();

    let mut duplicate_groups: Vec<Vec<usize>> = groups
        .into_values()
        .filter(|members| members.len() > 1)
        .collect();
    duplicate_groups.sort_by_key(|members| members[0]);

    DedupReport {
        unique_indices,
        duplicate_groups,
    }
}

/// Deduplicate inside a single text
///
/// Hash mode drops repeated lines; the other modes drop sentences similar to
/// an earlier kept sentence. Kept pieces are returned with their original
/// separators.
pub fn deduplicate_text(text: &str, method: DedupMethod, threshold: f32) -> String {
    match method {
        DedupMethod::Hash => {
            let mut seen = HashSet::new();

            text.split_inclusive('\n')
                .filter(|line| {
                    let normalized = normalize(line);
                    normalized.is_empty() || seen.insert(normalized)
                })
                .collect()
        }
        _ => {
            let mut kept: Vec<&str> = Vec::new();
            let mut output = String::with_capacity(text.len());

            for sentence in text.split_sentence_bounds() {
                let trimmed = sentence.trim();

                if trimmed.chars().count() >= MIN_COMPARABLE_CHARS {
                    let duplicate = kept
                        .iter()
                        .any(|k| text_similarity(trimmed, k, method) >= threshold);

                    if duplicate {
                        continue;
                    }

                    kept.push(trimmed);
                }

                output.push_str(sentence);
            }

            output
        }
    }
}

/// Union-find with path compression
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }

        root
    }

    /// Smaller root wins so the earliest document represents the group
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);

        if ra != rb {
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_ignores_case_and_punctuation() {
        assert_eq!(content_hash("Hello,   World!"), content_hash("hello world"));
        assert_ne!(content_hash("hello world"), content_hash("hello there"));
    }

    #[test]
    fn test_hash_dedup_groups() {
        let docs = vec!["Alpha beta.", "gamma", "alpha  BETA", "delta", "Gamma!"];

        let report = deduplicate(&docs, DedupMethod::Hash, 1.0);

        assert_eq!(report.unique_indices, vec![0, 1, 3]);
        assert_eq!(report.duplicate_groups, vec![vec![0, 2], vec![1, 4]]);
        assert_eq!(report.removed(), 2);
        assert_eq!(report.select(&docs), vec!["Alpha beta.", "gamma", "delta"]);
    }

    #[test]
    fn test_similarity_dedup_is_transitive() {
        let docs = vec!["aaaaaaaaaa", "aaaaaaaaab", "aaaaaaaabb", "zzzzzzzzzz"];

        let report = deduplicate(&docs, DedupMethod::Similarity, 0.85);

        assert_eq!(report.unique_indices, vec![0, 3]);
        assert_eq!(report.duplicate_groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let docs = vec![
            "Retrieval augmented generation combines search and generation.",
            "Retrieval-augmented generation combines search with generation.",
            "Vector indexes store embeddings for nearest neighbour search.",
            "BM25 is a lexical ranking function.",
        ];

        for method in [
            DedupMethod::Hash,
            DedupMethod::Similarity,
            DedupMethod::Jaccard,
            DedupMethod::Overlap,
        ] {
            let once = deduplicate(&docs, method, 0.8).select(&docs);
            let twice_report = deduplicate(&once, method, 0.8);

            assert!(!twice_report.duplicates_found(), "method {}", method);
            assert_eq!(twice_report.select(&once), once);
        }
    }

    #[test]
    fn test_overlap_similarity() {
        let score = text_similarity(
            "machine learning basics",
            "the basics of machine learning explained",
            DedupMethod::Overlap,
        );
        assert!((score - 1.0).abs() < f32::EPSILON);
        assert_eq!(text_similarity("", "words", DedupMethod::Overlap), 0.0);
    }

    #[test]
    fn test_deduplicate_text_lines() {
        let text = "first line\nSecond line\nfirst line!\n\nthird\n";

        assert_eq!(
            deduplicate_text(text, DedupMethod::Hash, 1.0),
            "first line\nSecond line\n\nthird\n"
        );
    }

    #[test]
    fn test_deduplicate_text_sentences() {
        let text = "The cache stores query results. The cache stores query results! Short. Eviction is LRU based.";

        let deduped = deduplicate_text(text, DedupMethod::Similarity, 0.9);

        assert_eq!(
            deduped,
            "The cache stores query results. Short. Eviction is LRU based."
        );
        assert_eq!(deduplicate_text(&deduped, DedupMethod::Similarity, 0.9), deduped);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("semantic".parse::<DedupMethod>().unwrap(), DedupMethod::Overlap);
        assert_eq!("HASH".parse::<DedupMethod>().unwrap(), DedupMethod::Hash);
        assert!("fuzzy".parse::<DedupMethod>().is_err());
    }
}
