//! Chunking strategy implementations
//!
//! Every chunker works on byte ranges of the input so that chunks stay
//! contiguous slices of the original text.

mod mixed;
mod paragraph;
mod sentence;
mod token;

pub use mixed::MixedChunker;
pub use paragraph::ParagraphChunker;
pub use sentence::SentenceChunker;
pub use token::TokenChunker;

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::retrieval::{Chunk, TokenEstimator};

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Characters after which a token cut may be placed
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', ';', '\n', '。', '！', '？', '；'];

/// Sentence ranges inside `span`, trailing whitespace attached
pub(crate) fn sentence_spans(text: &str, span: Range<usize>) -> Vec<Range<usize>> {
    let base = span.start;

    text[span]
        .split_sentence_bound_indices()
        .map(|(offset, sentence)| base + offset..base + offset + sentence.len())
        .collect()
}

/// Paragraph ranges, each ending with its blank-line separator
pub(crate) fn paragraph_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;

    for separator in PARAGRAPH_BREAK.find_iter(text) {
        spans.push(start..separator.end());
        start = separator.end();
    }

    if start < text.len() {
        spans.push(start..text.len());
    }

    spans
}

/// Greedily merge consecutive spans while the merged slice fits `max_tokens`
///
/// Spans that are over budget on their own are handed to `split_oversized`.
pub(crate) fn pack_spans(
    text: &str,
    spans: Vec<Range<usize>>,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
    split_oversized: &dyn Fn(Range<usize>) -> Vec<Range<usize>>,
) -> Vec<Range<usize>> {
    let mut packed = Vec::new();
    let mut current: Option<Range<usize>> = None;

    for span in spans {
        if estimator.count(&text[span.clone()]) > max_tokens {
            if let Some(open) = current.take() {
                packed.push(open);
            }
            packed.extend(split_oversized(span));
            continue;
        }

        current = match current {
            Some(open) if estimator.count(&text[open.start..span.end]) <= max_tokens => {
                Some(open.start..span.end)
            }
            Some(open) => {
                packed.push(open);
                Some(span)
            }
            None => Some(span),
        };
    }

    if let Some(open) = current {
        packed.push(open);
    }

    packed
}

/// Cut `span` into pieces sized by the estimated characters-per-token ratio
///
/// Each cut snaps back to a sentence terminator, or failing that to
/// whitespace, within a lookback window of a fifth of the piece.
pub(crate) fn token_spans(
    text: &str,
    span: Range<usize>,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<Range<usize>> {
    let slice = &text[span.clone()];
    let total_chars = slice.chars().count();
    let total_tokens = estimator.count(slice).max(1);
    let chars_per_token = (total_chars as f64 / total_tokens as f64).max(1.0);
    let window = ((max_tokens as f64 * chars_per_token).floor() as usize).max(1);

    let mut pieces = Vec::new();
    let mut start = span.start;

    while start < span.end {
        let rest = &text[start..span.end];
        let mut window_chars = window;

        loop {
            let cut = cut_point(rest, window_chars);

            if estimator.count(&rest[..cut]) <= max_tokens || window_chars <= 1 {
                pieces.push(start..start + cut);
                start += cut;
                break;
            }

            window_chars = (window_chars * 9 / 10).clamp(1, window_chars - 1);
        }
    }

    pieces
}

/// Byte offset in `rest` where a piece of at most `window_chars` characters ends
fn cut_point(rest: &str, window_chars: usize) -> usize {
    let Some((hard, _)) = rest.char_indices().nth(window_chars) else {
        return rest.len();
    };

    let lookback = (window_chars / 5).max(1);
    let lookback_start = rest
        .char_indices()
        .nth(window_chars - lookback)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window = &rest[lookback_start..hard];

    let snapped = window
        .rfind(SENTENCE_TERMINATORS)
        .or_else(|| window.rfind(char::is_whitespace));

    let cut = match snapped {
        Some(pos) => {
            let at = lookback_start + pos;
            let len = rest[at..].chars().next().map(char::len_utf8).unwrap_or(1);
            at + len
        }
        None => hard,
    };

    // Whitespace following the cut belongs to the piece
    let trailing = rest[cut..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(rest.len() - cut);

    cut + trailing
}

/// Materialize ranges, skipping whitespace-only pieces
pub(crate) fn to_chunks(
    text: &str,
    ranges: Vec<Range<usize>>,
    estimator: &dyn TokenEstimator,
) -> Vec<Chunk> {
    ranges
        .into_iter()
        .map(|range| &text[range])
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| Chunk::new(piece, estimator.count(piece)))
        .collect()
}
