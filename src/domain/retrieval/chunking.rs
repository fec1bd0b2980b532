//! Chunking strategy trait and types

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;

use crate::domain::DomainError;

/// A bounded slice of text with its estimated token count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub approx_tokens: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, approx_tokens: usize) -> Self {
        Self {
            text: text.into(),
            approx_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Available chunking strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategyType {
    /// Pack whole sentences
    Sentence,
    /// Pack paragraphs, oversized ones fall back to sentences
    Paragraph,
    /// Cut by estimated characters per token
    Token,
    /// Paragraph, then sentence, then token
    #[default]
    Mixed,
}

impl ChunkStrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
            Self::Token => "token",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ChunkStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChunkStrategyType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sentence" => Ok(Self::Sentence),
            "paragraph" => Ok(Self::Paragraph),
            "token" => Ok(Self::Token),
            "mixed" => Ok(Self::Mixed),
            other => Err(DomainError::configuration(format!(
                "Unknown chunk strategy '{}'",
                other
            ))),
        }
    }
}

/// Trait for chunking strategies
///
/// Chunks are contiguous slices of the input: concatenating them yields the
/// input text, minus whitespace-only pieces. No chunk exceeds `max_tokens`
/// unless it is a single sentence or word that cannot be split further by
/// the strategy.
pub trait ChunkingStrategy: Send + Sync + Debug {
    /// Split text into chunks of at most `max_tokens` estimated tokens
    fn chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<Chunk>, DomainError>;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

/// Reject a zero token budget
pub fn validate_max_tokens(max_tokens: usize) -> Result<(), DomainError> {
    if max_tokens == 0 {
        return Err(DomainError::validation("max_tokens must be greater than 0"));
    }

    Ok(())
}
