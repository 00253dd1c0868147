//! Cost calculation from per-token prices (all USD per token, per §3's
//! `ProviderMapping`).

/// The subset of a `ProviderMapping`'s pricing fields needed to cost one
/// request. Kept separate from the router's registry type so this crate
/// stays a leaf (no dependency on `gateway-router`).
#[derive(Clone, Copy, Debug, Default)]
pub struct Prices {
    pub input_price: f64,
    pub output_price: f64,
    pub cached_input_price: Option<f64>,
    pub request_price: Option<f64>,
    /// A multiplicative discount applied to the computed cost, `(0, 1]`.
    pub discount: f64,
}

/// A cost breakdown for one request, mirroring the `Log` entity's cost
/// fields.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub cached_input_cost: f64,
    pub request_cost: f64,
    pub cost: f64,
}

/// Compute the cost of one request given token counts and prices.
///
/// `cached_tokens` are billed at `cached_input_price` (falling back to
/// `input_price` when the mapping doesn't distinguish) and are *not*
/// double-counted against `prompt_tokens` — callers pass
/// `prompt_tokens` as the full prompt count; this function treats the
/// cached portion as already included within it and bills the
/// non-cached remainder at the standard input price.
#[must_use]
pub fn calculate_cost(prices: &Prices, prompt_tokens: u64, completion_tokens: u64, cached_tokens: u64) -> CostBreakdown {
    let discount = if prices.discount > 0.0 { prices.discount } else { 1.0 };
    let cached = cached_tokens.min(prompt_tokens);
    let uncached_prompt = prompt_tokens - cached;

    let cached_price = prices.cached_input_price.unwrap_or(prices.input_price);
    let input_cost = uncached_prompt as f64 * prices.input_price * discount;
    let cached_input_cost = cached as f64 * cached_price * discount;
    let output_cost = completion_tokens as f64 * prices.output_price * discount;
    let request_cost = prices.request_price.unwrap_or(0.0) * discount;

    CostBreakdown {
        input_cost,
        output_cost,
        cached_input_cost,
        request_cost,
        cost: input_cost + output_cost + cached_input_cost + request_cost,
    }
}
