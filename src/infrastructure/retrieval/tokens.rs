//! Token estimator implementations

use std::sync::Arc;

use tracing::warn;

use crate::config::TokenCounterType;
use crate::domain::retrieval::{HeuristicTokenEstimator, TokenEstimator};

#[cfg(feature = "tiktoken")]
pub use tiktoken::TiktokenEstimator;

#[cfg(feature = "tiktoken")]
mod tiktoken {
    use moka::sync::Cache;
    use sha2::{Digest, Sha256};
    use std::fmt;
    use std::sync::Arc;
    use tiktoken_rs::CoreBPE;

    use crate::domain::retrieval::TokenEstimator;
    use crate::domain::DomainError;

    /// Exact counts with the cl100k_base tokenizer, cached per content hash
    pub struct TiktokenEstimator {
        bpe: Arc<CoreBPE>,
        cache: Cache<String, usize>,
    }

    impl fmt::Debug for TiktokenEstimator {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("TiktokenEstimator")
                .field("cached", &self.cache.entry_count())
                .finish()
        }
    }

    impl TiktokenEstimator {
        pub fn new(cache_capacity: u64) -> Result<Self, DomainError> {
            let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
                DomainError::configuration(format!("Failed to load cl100k_base tokenizer: {}", e))
            })?;

            Ok(Self {
                bpe: Arc::new(bpe),
                cache: Cache::new(cache_capacity),
            })
        }
    }

    impl TokenEstimator for TiktokenEstimator {
        fn count(&self, text: &str) -> usize {
            let hash = hex::encode(Sha256::digest(text.as_bytes()));
            self.cache
                .get_with(hash, || self.bpe.encode_ordinary(text).len())
        }

        fn name(&self) -> &'static str {
            "tiktoken"
        }
    }

}

/// Factory for token estimators
#[derive(Debug)]
pub struct TokenEstimatorFactory;

impl TokenEstimatorFactory {
    /// Create the requested estimator, falling back to the heuristic one
    pub fn create(counter: TokenCounterType) -> Arc<dyn TokenEstimator> {
        match counter {
            TokenCounterType::Heuristic => Arc::new(HeuristicTokenEstimator::new()),
            TokenCounterType::Tiktoken => Self::create_tiktoken(),
        }
    }

    #[cfg(feature = "tiktoken")]
    fn create_tiktoken() -> Arc<dyn TokenEstimator> {
        match TiktokenEstimator::new(10_000) {
            Ok(estimator) => Arc::new(estimator),
            Err(e) => {
                warn!(error = %e, "Exact token counter unavailable, using heuristic estimate");
                Arc::new(HeuristicTokenEstimator::new())
            }
        }
    }

    #[cfg(not(feature = "tiktoken"))]
    fn create_tiktoken() -> Arc<dyn TokenEstimator> {
        warn!("Built without the tiktoken feature, using heuristic token estimate");
        Arc::new(HeuristicTokenEstimator::new())
    }
}
