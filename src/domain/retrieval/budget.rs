//! Token budgeting

use super::chunking::Chunk;
use super::tokens::TokenEstimator;

/// Keep leading chunks while the running total fits in `max_tokens`
///
/// Stops at the first chunk that would overflow. When the very first chunk
/// alone is over budget it is truncated instead of dropped, so a non-empty
/// input with a positive budget never yields an empty result.
pub fn budget_chunks(
    chunks: Vec<Chunk>,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<Chunk> {
    if max_tokens == 0 {
        return Vec::new();
    }

    let mut selected = Vec::new();
    let mut total = 0;

    for chunk in chunks {
        if total + chunk.approx_tokens <= max_tokens {
            total += chunk.approx_tokens;
            selected.push(chunk);
            continue;
        }

        if selected.is_empty() {
            selected.push(truncate_to_budget(&chunk, max_tokens, estimator));
        }

        break;
    }

    selected
}

/// Cut a chunk proportionally until its estimate fits the budget
pub fn truncate_to_budget(
    chunk: &Chunk,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Chunk {
    let chars: Vec<(usize, char)> = chunk.text.char_indices().collect();
    let tokens = chunk.approx_tokens.max(1);

    let mut keep = (chars.len() * max_tokens / tokens).clamp(1, chars.len().max(1));

    loop {
        let end = chars.get(keep).map(|(i, _)| *i).unwrap_or(chunk.text.len());
        let text = &chunk.text[..end];
        let count = estimator.count(text);

        if count <= max_tokens || keep <= 1 {
            return Chunk::new(text, count);
        }

        keep = (keep * 9 / 10).min(keep - 1).max(1);
    }
}

/// Sum of estimated tokens
pub fn total_tokens(chunks: &[Chunk]) -> usize {
    chunks.iter().map(|c| c.approx_tokens).sum()
}
