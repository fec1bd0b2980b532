//! Token estimation

use std::fmt::Debug;

use super::tokenize::script_counts;

/// Best-effort token counter used for chunk sizing and budgeting
pub trait TokenEstimator: Send + Sync + Debug {
    /// Estimate the number of tokens in `text`
    fn count(&self, text: &str) -> usize;

    /// Get the estimator name
    fn name(&self) -> &'static str;
}

/// Deterministic estimator: one token per CJK character, 1.3 per Latin word
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenEstimator;

impl HeuristicTokenEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl TokenEstimator for HeuristicTokenEstimator {
    fn count(&self, text: &str) -> usize {
        let (cjk, words) = script_counts(text);

        // ceil(words * 1.3) in integer arithmetic
        cjk + (words * 13).div_ceil(10)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_latin_words() {
        let estimator = HeuristicTokenEstimator::new();

        assert_eq!(estimator.count("one two three four five six seven eight nine ten"), 13);
        assert_eq!(estimator.count("hello"), 2);
    }

    #[test]
    fn test_heuristic_cjk_characters() {
        let estimator = HeuristicTokenEstimator::new();

        assert_eq!(estimator.count("机器学习"), 4);
        assert_eq!(estimator.count("机器学习 model"), 6);
    }

    #[test]
    fn test_heuristic_is_deterministic_and_zero_for_empty() {
        let estimator = HeuristicTokenEstimator::new();

        assert_eq!(estimator.count(""), 0);
        assert_eq!(estimator.count("a b c"), estimator.count("a b c"));
    }
}
