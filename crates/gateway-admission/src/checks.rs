//! Request-shape and policy checks (spec.md §4.1 steps 6-12).

use chrono::Utc;

use gateway_core::log::{Plan, ProjectMode};
use gateway_core::wire::{ChatCompletionRequest, ResponseFormatKind};
use gateway_core::GatewayError;
use gateway_router::registry::{Model, ProviderMapping};

use crate::auth::AdmissionStore;

/// Step 8: a `<name>/model` address must resolve to a registered custom
/// provider for the caller's organization.
pub fn check_custom_provider(organization_id: &str, custom_provider_name: &str, store: &dyn AdmissionStore) -> Result<(), GatewayError> {
    if store.custom_provider_exists(organization_id, custom_provider_name) {
        Ok(())
    } else {
        Err(GatewayError::invalid_request(format!("unknown custom provider '{custom_provider_name}'")))
    }
}

/// Step 9: `response_format.type = json_object` is only allowed for
/// models that declare `jsonOutput = true`.
pub fn check_json_mode(request: &ChatCompletionRequest, model: &Model) -> Result<(), GatewayError> {
    let wants_json = request
        .response_format
        .as_ref()
        .is_some_and(|f| f.kind == ResponseFormatKind::JsonObject);
    if wants_json && !model.json_output {
        return Err(GatewayError::invalid_request_param(
            format!("model '{}' does not support response_format=json_object", model.id),
            "response_format",
        ));
    }
    Ok(())
}

/// Step 10: `reasoning_effort` is only allowed when at least one of the
/// model's provider mappings supports reasoning.
pub fn check_reasoning_effort(request: &ChatCompletionRequest, model: &Model) -> Result<(), GatewayError> {
    if request.reasoning_effort.is_some() && !model.providers.iter().any(|p| p.reasoning) {
        return Err(GatewayError::invalid_request_param(
            format!("model '{}' does not support reasoning_effort", model.id),
            "reasoning_effort",
        ));
    }
    Ok(())
}

/// Step 11: a deactivated model is rejected permanently, not just for
/// this request.
pub fn check_not_deactivated(model: &Model) -> Result<(), GatewayError> {
    if model.is_deactivated(Utc::now()) {
        return Err(GatewayError::Gone(format!("model '{}' has been deactivated", model.id)));
    }
    Ok(())
}

/// Step 12: `max_tokens`, whether supplied by the caller or defaulted by
/// the dialect adapter, must not exceed the selected mapping's
/// `maxOutput`. Called once pre-routing (if the caller supplied a value)
/// and again post-routing with the resolved default.
pub fn check_max_tokens(max_tokens: u64, mapping: &ProviderMapping) -> Result<(), GatewayError> {
    if max_tokens > mapping.max_output {
        return Err(GatewayError::invalid_request_param(
            format!("max_tokens {max_tokens} exceeds the model's maximum output of {}", mapping.max_output),
            "max_tokens",
        ));
    }
    Ok(())
}

/// Step 7 (gating half): in hosted+paid mode, callers sending any
/// `x-llmgateway-*` header must be on the `pro` plan.
pub fn check_llmgateway_header_plan_gate(
    has_llmgateway_headers: bool,
    hosted: bool,
    paid_mode: bool,
    plan: Plan,
) -> Result<(), GatewayError> {
    if has_llmgateway_headers && hosted && paid_mode && plan != Plan::Pro {
        return Err(GatewayError::PaymentRequired("x-llmgateway-* headers require a pro plan".into()));
    }
    Ok(())
}

/// Plan gating for the project mode itself (spec.md §4.1 "Plan gating"):
/// in hosted+paid mode, `api-keys`/`hybrid-with-key-present` requires
/// `pro`; falling back to credits does not. Custom providers are
/// forbidden in pure `credits` mode.
pub fn check_project_mode_gate(
    mode: ProjectMode,
    has_provider_key_for_route: bool,
    is_custom_provider_route: bool,
    hosted: bool,
    paid_mode: bool,
    plan: Plan,
) -> Result<(), GatewayError> {
    if is_custom_provider_route && mode == ProjectMode::Credits {
        return Err(GatewayError::invalid_request("custom providers are not available in credits mode"));
    }
    let using_own_key = matches!(mode, ProjectMode::ApiKeys) || (mode == ProjectMode::Hybrid && has_provider_key_for_route);
    if using_own_key && hosted && paid_mode && plan != Plan::Pro {
        return Err(GatewayError::PaymentRequired("bringing your own provider key requires a pro plan".into()));
    }
    Ok(())
}

/// Credits-mode payment gate: reject when the organization is out of
/// credits and the model isn't free (spec.md §4.2 key resolution: 402 if
/// `credits ≤ 0` and model is not `free`).
pub fn check_credits(credits: f64, model_is_free: bool) -> Result<(), GatewayError> {
    if credits <= 0.0 && !model_is_free {
        return Err(GatewayError::PaymentRequired("organization is out of credits".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_router::registry::global;

    #[test]
    fn json_mode_rejected_for_non_json_model() {
        let model = global().model("gpt-4o-mini").unwrap();
        let mut request = sample_request();
        request.response_format = Some(gateway_core::wire::ResponseFormat { kind: ResponseFormatKind::JsonObject });
        assert!(check_json_mode(&request, model).is_err());
    }

    #[test]
    fn json_mode_allowed_for_json_model() {
        let model = global().model("gpt-5-nano").unwrap();
        let mut request = sample_request();
        request.response_format = Some(gateway_core::wire::ResponseFormat { kind: ResponseFormatKind::JsonObject });
        assert!(check_json_mode(&request, model).is_ok());
    }

    #[test]
    fn reasoning_effort_rejected_when_unsupported() {
        let model = global().model("gpt-4o-mini").unwrap();
        let mut request = sample_request();
        request.reasoning_effort = Some(gateway_core::wire::ReasoningEffort::High);
        assert!(check_reasoning_effort(&request, model).is_err());
    }

    #[test]
    fn reasoning_effort_allowed_when_supported() {
        let model = global().model("gpt-5-nano").unwrap();
        let mut request = sample_request();
        request.reasoning_effort = Some(gateway_core::wire::ReasoningEffort::High);
        assert!(check_reasoning_effort(&request, model).is_ok());
    }

    #[test]
    fn max_tokens_rejected_beyond_mapping_limit() {
        let model = global().model("gpt-4o-mini").unwrap();
        let mapping = model.mapping_for("openai").unwrap();
        assert!(check_max_tokens(mapping.max_output + 1, mapping).is_err());
    }

    #[test]
    fn max_tokens_allowed_at_limit() {
        let model = global().model("gpt-4o-mini").unwrap();
        let mapping = model.mapping_for("openai").unwrap();
        assert!(check_max_tokens(mapping.max_output, mapping).is_ok());
    }

    #[test]
    fn custom_provider_route_rejected_in_credits_mode() {
        let err = check_project_mode_gate(ProjectMode::Credits, false, true, true, true, Plan::Pro).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn api_keys_mode_requires_pro_in_hosted_paid_mode() {
        let err = check_project_mode_gate(ProjectMode::ApiKeys, true, false, true, true, Plan::Free).unwrap_err();
        assert_eq!(err.status_code(), 402);
    }

    #[test]
    fn hybrid_without_provider_key_does_not_require_pro() {
        assert!(check_project_mode_gate(ProjectMode::Hybrid, false, false, true, true, Plan::Free).is_ok());
    }

    #[test]
    fn credits_exhausted_rejects_non_free_model() {
        let err = check_credits(0.0, false).unwrap_err();
        assert_eq!(err.status_code(), 402);
    }

    #[test]
    fn credits_exhausted_allows_free_model() {
        assert!(check_credits(0.0, true).is_ok());
    }

    #[test]
    fn llmgateway_headers_require_pro_plan_when_hosted_and_paid() {
        let err = check_llmgateway_header_plan_gate(true, true, true, Plan::Free).unwrap_err();
        assert_eq!(err.status_code(), 402);
    }

    #[test]
    fn llmgateway_headers_allowed_without_hosted_paid_mode() {
        assert!(check_llmgateway_header_plan_gate(true, false, false, Plan::Free).is_ok());
    }

    fn sample_request() -> ChatCompletionRequest {
        use gateway_core::wire::{ChatMessage, Content, Role};
        ChatCompletionRequest {
            model: "gpt-5-nano".to_string(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: Some(Content::Text("hi".to_string())),
                name: None,
                tool_call_id: None,
                tool_calls: None,
                reasoning_content: None,
                images: None,
            }],
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            response_format: None,
            stream: None,
            tools: None,
            tool_choice: None,
            reasoning_effort: None,
        }
    }
}
