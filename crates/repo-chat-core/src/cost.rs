//! Embedding cost formula.
//!
//! Cost is linear in token count: `tokens / 1000 * rate`. The rate is a
//! price per 1K tokens in USD and is overridable from config because
//! provider pricing changes.

use serde::Serialize;

/// Default price, USD per 1K embedded tokens.
pub const DEFAULT_USD_PER_1K_TOKENS: f64 = 0.0001;

/// Result of estimating a directory before ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl CostEstimate {
    pub fn from_tokens(total_tokens: u64, usd_per_1k_tokens: f64) -> Self {
        Self {
            total_tokens,
            cost_usd: cost_usd(total_tokens, usd_per_1k_tokens),
        }
    }
}

/// Convert a token count to an estimated USD cost.
pub fn cost_usd(tokens: u64, usd_per_1k_tokens: f64) -> f64 {
    tokens as f64 / 1000.0 * usd_per_1k_tokens
}
