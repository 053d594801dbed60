//! Throughput estimator.
//!
//! The token count is a display approximation (four characters per token),
//! not a tokenizer. It must stay exactly `ceil(chars / 4)`.

use relaychat_types::StreamingStats;

const CHARS_PER_TOKEN: u64 = 4;

/// `ceil(character_count / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Tokens per second for `tokens` produced in `elapsed_ms`.
///
/// Returns `0.0` until a non-zero interval has elapsed.
pub fn tokens_per_second(tokens: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    let rate = tokens as f64 / elapsed_ms as f64 * 1000.0;
    if rate.is_finite() { rate } else { 0.0 }
}

/// Stats for the accumulated text after `elapsed_ms`.
pub fn measure(accumulated: &str, elapsed_ms: u64) -> StreamingStats {
    let token_count = estimate_tokens(accumulated);
    StreamingStats {
        token_count,
        elapsed_ms,
        tokens_per_second: tokens_per_second(token_count, elapsed_ms),
    }
}
