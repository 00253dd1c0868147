//! The synchronous slice of the request pipeline: admission (C1),
//! routing (C2), and the model-level policy checks that depend on the
//! resolved route. Bundled into one function so handlers can run it
//! inside a single `spawn_blocking` — everything here eventually touches
//! `gateway_config::Store`'s blocking `rusqlite` calls.

use std::collections::HashMap;

use gateway_admission::auth::{authenticate, Identity};
use gateway_admission::checks::{
    check_credits, check_json_mode, check_llmgateway_header_plan_gate, check_max_tokens, check_not_deactivated, check_project_mode_gate,
    check_reasoning_effort,
};
use gateway_config::Store;
use gateway_core::wire::ChatCompletionRequest;
use gateway_core::GatewayError;
use gateway_router::registry::{Model, Registry};
use gateway_router::{route, RouteRequest, RouteResult};
use gateway_tokenizer::Tokenizer;

/// Everything downstream stages (dialect adapter, upstream call, usage
/// logging) need out of admission + routing.
pub struct Admitted {
    pub identity: Identity,
    pub route: RouteResult,
    pub model: Option<&'static Model>,
}

/// Run admission steps 3-12 (spec.md §4.1) and routing (§4.2) against the
/// already-parsed request body. Pure aside from the `Store` calls, so it
/// is safe to run inside `tokio::task::spawn_blocking`.
#[allow(clippy::too_many_arguments)]
pub fn admit_and_route(
    store: &Store,
    registry: &'static Registry,
    tokenizer: &dyn Tokenizer,
    hosted: bool,
    paid_mode: bool,
    use_responses_api_env: bool,
    auth_header: Option<&str>,
    llmgateway_headers: &HashMap<String, String>,
    request: &ChatCompletionRequest,
) -> Result<Admitted, GatewayError> {
    let identity = authenticate(auth_header, store)?;
    route_with_identity(store, registry, tokenizer, hosted, paid_mode, use_responses_api_env, llmgateway_headers, request, identity)
}

/// Run the identity-dependent half of admission (steps 6-12) plus routing,
/// given an already-authenticated [`Identity`]. Split out from
/// [`admit_and_route`] so a caller can retain `identity` across a failure
/// here and still attach a log row to it (unlike a step-3-5 auth failure,
/// which has no identity to attach one to at all).
#[allow(clippy::too_many_arguments)]
pub fn route_with_identity(
    store: &Store,
    registry: &'static Registry,
    tokenizer: &dyn Tokenizer,
    hosted: bool,
    paid_mode: bool,
    use_responses_api_env: bool,
    llmgateway_headers: &HashMap<String, String>,
    request: &ChatCompletionRequest,
    identity: Identity,
) -> Result<Admitted, GatewayError> {
    check_llmgateway_header_plan_gate(!llmgateway_headers.is_empty(), hosted, paid_mode, identity.organization.plan)?;

    let route_request = RouteRequest {
        model_input: &request.model,
        organization_id: &identity.organization.id,
        project_mode: identity.project.mode,
        messages: &request.messages,
        tools: request.tools.as_deref(),
        max_tokens: request.max_tokens,
        has_existing_tool_calls: request.has_existing_tool_calls(),
        stream: request.wants_stream(),
        use_responses_api_env,
    };
    let route_result = route(&route_request, registry, tokenizer, store)?;

    let model = resolve_model(registry, &route_result);
    if let Some(model) = model {
        check_json_mode(request, model)?;
        check_reasoning_effort(request, model)?;
        check_not_deactivated(model)?;
    }

    check_project_mode_gate(
        identity.project.mode,
        route_result.key.is_provider_key,
        route_result.used_provider == "custom",
        hosted,
        paid_mode,
        identity.organization.plan,
    )?;

    if !route_result.key.is_provider_key {
        check_credits(identity.organization.credits, model.is_some_and(|m| m.free))?;
    }

    if let Some(max_tokens) = request.max_tokens {
        check_max_tokens(max_tokens, &route_result.mapping)?;
    }

    Ok(Admitted {
        identity,
        route: route_result,
        model,
    })
}

/// Find the registry [`Model`] backing a resolved route, by
/// `(provider_id, model_name)` rather than `used_model` — the latter is
/// reformatted to a display string for `auto`/pseudo routes and doesn't
/// round-trip as a registry key. Custom-provider routes legitimately
/// resolve to `None`: they aren't registry entries, so model-level gates
/// (json mode, reasoning, deactivation) don't apply to them.
fn resolve_model(registry: &'static Registry, route: &RouteResult) -> Option<&'static Model> {
    registry
        .models
        .iter()
        .find(|model| model.providers.iter().any(|p| p.provider_id == route.used_provider && p.model_name.as_ref() == route.mapping.model_name.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::{new_in_memory, PoolConfig};
    use gateway_core::entities::{ApiKey, Organization, Project};
    use gateway_core::log::{KeyStatus, Plan, ProjectMode, RetentionLevel};
    use gateway_core::wire::{ChatMessage, Content, Role};
    use gateway_tokenizer::default_tokenizer;

    fn store() -> Store {
        let pool = new_in_memory(&PoolConfig::default()).unwrap();
        let store = Store::new(pool);
        store.migrate().unwrap();
        store
    }

    fn seed(store: &Store) -> String {
        let org = Organization {
            id: "org_1".to_string(),
            plan: Plan::Pro,
            credits: 10.0,
            auto_top_up_enabled: false,
            auto_top_up_threshold: 0.0,
            auto_top_up_amount: 0.0,
            stripe_customer_id: None,
            retention_level: RetentionLevel::All,
        };
        store.create_organization(&org).unwrap();
        let project = Project {
            id: "proj_1".to_string(),
            organization_id: "org_1".to_string(),
            mode: ProjectMode::Credits,
            caching_enabled: false,
            cache_duration_seconds: 60,
        };
        store.create_project(&project).unwrap();
        let key = ApiKey {
            id: "key_1".to_string(),
            token: "sk-test-gateway".to_string(),
            project_id: "proj_1".to_string(),
            status: KeyStatus::Active,
            usage: 0.0,
            usage_limit: None,
        };
        store.create_api_key(&key).unwrap();
        key.token
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "openai/gpt-5-nano".to_string(),
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

    #[test]
    fn missing_authorization_is_rejected() {
        let store = store();
        let registry = gateway_router::registry::global();
        let tokenizer = default_tokenizer();
        let err = admit_and_route(&store, registry, &tokenizer, false, false, false, None, &HashMap::new(), &request()).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn valid_key_routes_successfully_with_env_token() {
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "sk-upstream-token");
        }
        let store = store();
        let token = seed(&store);
        let registry = gateway_router::registry::global();
        let tokenizer = default_tokenizer();
        let auth = format!("Bearer {token}");
        let admitted = admit_and_route(&store, registry, &tokenizer, false, false, false, Some(&auth), &HashMap::new(), &request()).unwrap();
        assert_eq!(admitted.route.used_provider, "openai");
        assert!(admitted.model.is_some());
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
    }
}
