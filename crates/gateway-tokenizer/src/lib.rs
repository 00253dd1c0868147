//! The local token estimator and cost calculator.
//!
//! Every provider dialect ultimately needs two things this crate supplies:
//! a best-effort token count when upstream doesn't report one, and a cost
//! calculation from per-token prices. Isolated behind the [`Tokenizer`]
//! trait per the REDESIGN FLAG in spec.md §9 ("known to over-estimate for
//! non-OpenAI models; keep it as the single local fallback but isolate
//! behind a `Tokenizer` interface so a per-family implementation can be
//! swapped in").

mod cost;
mod gpt;

pub use cost::{calculate_cost, CostBreakdown, Prices};
pub use gpt::GptTokenizer;

use gateway_core::{ChatMessage, Tool};

/// A pluggable token estimator. The gateway only ever needs an estimate —
/// upstream providers are the source of truth when they report usage.
pub trait Tokenizer: Send + Sync {
    /// Estimate the token count of a flattened chat message history plus
    /// any tool definitions offered alongside it.
    fn count_messages(&self, messages: &[ChatMessage], tools: Option<&[Tool]>) -> u64;

    /// Estimate the token count of a single piece of produced text (e.g.
    /// assistant content accumulated from a stream).
    fn count_text(&self, text: &str) -> u64;
}

/// The default tokenizer used across every provider dialect: a "gpt-4"
/// tiktoken encoding. Known to over-estimate token counts for non-OpenAI
/// models, but it is the only local fallback and is never the primary
/// source of truth when upstream reports real usage.
#[must_use]
pub fn default_tokenizer() -> GptTokenizer {
    GptTokenizer::new()
}
