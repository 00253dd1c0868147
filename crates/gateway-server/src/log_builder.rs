//! Assembles one [`Log`] row per terminal request outcome (§4.5 "on any
//! terminal outcome ... pushes it to a durable queue"), folding in cost
//! accounting from [`gateway_tokenizer::cost`].

use chrono::Utc;
use gateway_admission::auth::Identity;
use gateway_core::log::{Log, RetentionLevel, UnifiedFinishReason, UsedMode};
use gateway_core::wire::FinishReason;
use gateway_router::RouteResult;
use gateway_tokenizer::cost::{calculate_cost, Prices};

/// Token/content/finish-reason facts gathered from the dialect adapter
/// (one-shot response or accumulated stream), independent of how the
/// request was served.
#[derive(Default)]
pub struct Outcome {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_results: Option<serde_json::Value>,
    pub finish_reason: Option<FinishReason>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
    pub response_size: i64,
    pub streamed: bool,
    pub canceled: bool,
    pub cached: bool,
    /// Whether `prompt_tokens`/`completion_tokens` were filled by the
    /// local tokenizer fallback rather than reported by upstream.
    pub estimated: bool,
    pub error: Option<serde_json::Value>,
}

/// Build and (when retention is `none`) redact the `Log` row for one
/// completed request.
#[must_use]
pub fn build_log(request_id: String, identity: &Identity, route: &RouteResult, outcome: Outcome, duration_ms: i64) -> Log {
    let prices = Prices {
        input_price: route.mapping.input_price,
        output_price: route.mapping.output_price,
        cached_input_price: route.mapping.cached_input_price,
        request_price: route.mapping.request_price,
        discount: route.mapping.discount,
    };
    let cost = calculate_cost(&prices, outcome.prompt_tokens, outcome.completion_tokens, outcome.cached_tokens);
    let total_tokens = outcome.prompt_tokens + outcome.completion_tokens + outcome.reasoning_tokens;

    let mut log = Log {
        request_id,
        organization_id: identity.organization.id.clone(),
        project_id: identity.project.id.clone(),
        api_key_id: identity.api_key.id.clone(),
        used_mode: Some(if route.key.is_provider_key { UsedMode::ApiKeys } else { UsedMode::Credits }),
        used_model: Some(route.used_model.clone()),
        used_provider: Some(route.used_provider.clone()),
        requested_model: route.requested_model.clone(),
        requested_provider: route.requested_provider.clone(),
        duration_ms,
        response_size: outcome.response_size,
        content: outcome.content,
        reasoning_content: outcome.reasoning_content,
        finish_reason: outcome.finish_reason.map(|reason| format!("{reason:?}").to_lowercase()),
        unified_finish_reason: Some(unify_finish_reason(outcome.finish_reason, outcome.canceled, outcome.error.is_some())),
        #[allow(clippy::cast_possible_wrap)]
        prompt_tokens: outcome.prompt_tokens as i64,
        #[allow(clippy::cast_possible_wrap)]
        completion_tokens: outcome.completion_tokens as i64,
        #[allow(clippy::cast_possible_wrap)]
        total_tokens: total_tokens as i64,
        #[allow(clippy::cast_possible_wrap)]
        reasoning_tokens: outcome.reasoning_tokens as i64,
        #[allow(clippy::cast_possible_wrap)]
        cached_tokens: outcome.cached_tokens as i64,
        has_error: outcome.error.is_some(),
        streamed: outcome.streamed,
        canceled: outcome.canceled,
        error_details: outcome.error,
        cost: cost.cost,
        input_cost: cost.input_cost,
        output_cost: cost.output_cost,
        cached_input_cost: cost.cached_input_cost,
        request_cost: cost.request_cost,
        estimated_cost: outcome.estimated,
        cached: outcome.cached,
        tool_results: outcome.tool_results,
        processed_at: None,
        created_at: Utc::now(),
    };
    if identity.organization.retention_level == RetentionLevel::None {
        log.strip_for_retention();
    }
    log
}

/// Build the `Log` row for a request that never reached a route (auth
/// failure aside — that has no `Identity` to attach a log to at all).
/// Carries no provider/token/cost fields, per §7 "Admission errors
/// short-circuit before any upstream call; log row is still written
/// with `hasError=true` and no provider fields."
#[must_use]
pub fn build_error_log(request_id: String, identity: &Identity, requested_model: &str, error: &gateway_core::GatewayError, duration_ms: i64) -> Log {
    let mut log = Log {
        request_id,
        organization_id: identity.organization.id.clone(),
        project_id: identity.project.id.clone(),
        api_key_id: identity.api_key.id.clone(),
        used_mode: None,
        used_model: None,
        used_provider: None,
        requested_model: requested_model.to_string(),
        requested_provider: None,
        duration_ms,
        response_size: 0,
        content: None,
        reasoning_content: None,
        finish_reason: None,
        unified_finish_reason: Some(UnifiedFinishReason::GatewayError),
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        reasoning_tokens: 0,
        cached_tokens: 0,
        has_error: true,
        streamed: false,
        canceled: false,
        error_details: Some(error.to_envelope().error),
        cost: 0.0,
        input_cost: 0.0,
        output_cost: 0.0,
        cached_input_cost: 0.0,
        request_cost: 0.0,
        estimated_cost: false, // no usage was ever computed, so there's nothing to estimate
        cached: false,
        tool_results: None,
        processed_at: None,
        created_at: Utc::now(),
    };
    if identity.organization.retention_level == RetentionLevel::None {
        log.strip_for_retention();
    }
    log
}

fn unify_finish_reason(finish_reason: Option<FinishReason>, canceled: bool, has_error: bool) -> UnifiedFinishReason {
    if canceled {
        return UnifiedFinishReason::Canceled;
    }
    if has_error {
        return UnifiedFinishReason::GatewayError;
    }
    match finish_reason {
        Some(FinishReason::Stop) | None => UnifiedFinishReason::Stop,
        Some(FinishReason::Length) => UnifiedFinishReason::Length,
        Some(FinishReason::ToolCalls) => UnifiedFinishReason::ToolCalls,
        Some(FinishReason::ContentFilter) => UnifiedFinishReason::ContentFilter,
        Some(FinishReason::Canceled) => UnifiedFinishReason::Canceled,
    }
}
