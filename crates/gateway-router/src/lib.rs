//! The router (C2): resolves `(requestedModel, requestedProvider)` to
//! `(usedModel, usedProvider, endpointURL, upstreamToken)`.

pub mod endpoint;
pub mod headers;
pub mod keys;
pub mod registry;
pub mod resolve;

use gateway_core::{ChatMessage, GatewayError, ProjectMode, Tool};
use gateway_tokenizer::Tokenizer;

use endpoint::{build_endpoint, Endpoint};
use keys::{KeySource, ResolvedKey};
use registry::Registry;
use resolve::{resolve_bare_model, resolve_custom_provider, resolve_explicit_provider, select_auto, ModelResolution, ModelSyntax, ProviderAvailability};

/// Everything the router needs to know about the inbound request to
/// resolve a route.
pub struct RouteRequest<'a> {
    pub model_input: &'a str,
    pub organization_id: &'a str,
    pub project_mode: ProjectMode,
    pub messages: &'a [ChatMessage],
    pub tools: Option<&'a [Tool]>,
    pub max_tokens: Option<u64>,
    pub has_existing_tool_calls: bool,
    pub stream: bool,
    pub use_responses_api_env: bool,
}

/// The fully-resolved route: who we're calling, with what credential,
/// and how the requester's intent maps onto it (for `Log` fields).
#[derive(Clone, Debug)]
pub struct RouteResult {
    pub requested_model: String,
    pub requested_provider: Option<String>,
    pub used_model: String,
    pub used_provider: String,
    pub mapping: registry::ProviderMapping,
    pub endpoint: Endpoint,
    pub key: ResolvedKey,
}

/// Resolve a complete route: model+provider selection, then credential
/// attachment, then endpoint construction.
pub fn route(
    req: &RouteRequest<'_>,
    registry: &Registry,
    tokenizer: &dyn Tokenizer,
    key_source: &dyn KeySource,
) -> Result<RouteResult, GatewayError> {
    let syntax = resolve::parse_model_syntax(req.model_input, registry);

    let (resolution, custom_base_url): (ModelResolution, Option<String>) = match syntax {
        ModelSyntax::Auto => {
            let availability = mode_availability(req.project_mode, key_source, req.organization_id, registry);
            let required = resolve::required_context_budget(tokenizer, req.messages, req.tools, req.max_tokens);
            (select_auto(registry, &availability, required)?, None)
        }
        ModelSyntax::Custom => {
            return Err(GatewayError::invalid_request(
                "'custom' model requires a '<customProviderName>/<model>' form",
            ));
        }
        ModelSyntax::Provider { provider_id, model_name } => {
            (resolve_explicit_provider(registry, provider_id, model_name)?, None)
        }
        ModelSyntax::CustomProvider { name, model_name } => {
            if matches!(req.project_mode, ProjectMode::Credits) {
                return Err(GatewayError::invalid_request("custom providers are not available in credits mode"));
            }
            let (custom, resolution) = resolve_custom_provider(req.organization_id, name, model_name, key_source)?;
            let key = ResolvedKey {
                token: custom.token,
                base_url: Some(custom.base_url.clone()),
                is_provider_key: true,
            };
            let endpoint = build_endpoint(
                "custom",
                Some(&custom.base_url),
                model_name,
                Some(&key.token),
                req.stream,
                req.use_responses_api_env,
                false,
                false,
                req.has_existing_tool_calls,
            );
            return Ok(RouteResult {
                requested_model: req.model_input.to_string(),
                requested_provider: Some(name.to_string()),
                used_model: resolution.model_id.clone(),
                used_provider: "custom".to_string(),
                mapping: resolution.mapping,
                endpoint,
                key,
            });
        }
        ModelSyntax::Bare(model_name) => {
            let availability = mode_availability(req.project_mode, key_source, req.organization_id, registry);
            (resolve_bare_model(registry, &availability, model_name)?, None)
        }
    };
    let _ = &custom_base_url;

    let key = resolve_key(req.project_mode, req.organization_id, &resolution.provider_id, registry, key_source)?;

    let endpoint = build_endpoint(
        &resolution.provider_id,
        key.base_url.as_deref(),
        &resolution.mapping.model_name,
        Some(&key.token),
        req.stream,
        req.use_responses_api_env,
        resolution.mapping.reasoning,
        resolution.mapping.supports_responses_api,
        req.has_existing_tool_calls,
    );

    Ok(RouteResult {
        requested_model: req.model_input.to_string(),
        requested_provider: None,
        used_model: if resolution.is_pseudo {
            format!("{}/{}", resolution.provider_id, resolution.mapping.model_name)
        } else {
            resolution.model_id.clone()
        },
        used_provider: resolution.provider_id.clone(),
        mapping: resolution.mapping,
        endpoint,
        key,
    })
}

/// Decides which providers count as "available" for a project mode,
/// backed by live references rather than owned closures.
struct GatewayAvailability<'a> {
    mode: ProjectMode,
    key_source: &'a dyn KeySource,
    organization_id: &'a str,
    registry: &'a Registry,
}

impl ProviderAvailability for GatewayAvailability<'_> {
    fn is_available(&self, provider_id: &str) -> bool {
        let has_provider_key = || self.key_source.provider_key(self.organization_id, provider_id).is_some();
        let has_env_token = || {
            self.registry
                .provider(provider_id)
                .is_some_and(|p| keys::env_token(p).is_some())
        };
        match self.mode {
            ProjectMode::ApiKeys => has_provider_key(),
            ProjectMode::Credits => has_env_token(),
            ProjectMode::Hybrid => has_provider_key() || has_env_token(),
        }
    }
}

fn mode_availability<'a>(
    mode: ProjectMode,
    key_source: &'a dyn KeySource,
    organization_id: &'a str,
    registry: &'a Registry,
) -> GatewayAvailability<'a> {
    GatewayAvailability {
        mode,
        key_source,
        organization_id,
        registry,
    }
}

/// Resolve the credential to use for `(mode, provider)` (§4.2 "Key
/// resolution").
fn resolve_key(
    mode: ProjectMode,
    organization_id: &str,
    provider_id: &str,
    registry: &Registry,
    key_source: &dyn KeySource,
) -> Result<ResolvedKey, GatewayError> {
    let provider_key = key_source.provider_key(organization_id, provider_id);
    let env = registry
        .provider(provider_id)
        .and_then(keys::env_token);

    match mode {
        ProjectMode::ApiKeys => provider_key
            .map(|k| ResolvedKey {
                token: k.token,
                base_url: k.base_url,
                is_provider_key: true,
            })
            .ok_or_else(|| GatewayError::invalid_request(format!("no provider key configured for '{provider_id}'"))),
        ProjectMode::Credits => env
            .map(|token| ResolvedKey {
                token,
                base_url: None,
                is_provider_key: false,
            })
            .ok_or_else(|| GatewayError::PaymentRequired(format!("no credits-mode credential available for '{provider_id}'"))),
        ProjectMode::Hybrid => {
            if let Some(k) = provider_key {
                return Ok(ResolvedKey {
                    token: k.token,
                    base_url: k.base_url,
                    is_provider_key: true,
                });
            }
            env.map(|token| ResolvedKey {
                token,
                base_url: None,
                is_provider_key: false,
            })
            .ok_or_else(|| GatewayError::PaymentRequired(format!("no credential available for '{provider_id}'")))
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use gateway_core::{ChatMessage, Content, Role};
    use gateway_tokenizer::default_tokenizer;

    struct NoKeys;
    impl KeySource for NoKeys {
        fn provider_key(&self, _organization_id: &str, _provider_id: &str) -> Option<keys::ProviderKeyRef> {
            None
        }
        fn custom_provider(&self, _organization_id: &str, _name: &str) -> Option<keys::CustomProviderRef> {
            None
        }
    }

    fn user_message(text: &str) -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: Some(Content::Text(text.to_string())),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
            images: None,
        }
    }

    #[test]
    fn credits_mode_requires_env_token() {
        // SAFETY: test-local env var manipulation, single-threaded per test binary convention.
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
        let req = RouteRequest {
            model_input: "openai/gpt-5-nano",
            organization_id: "org_1",
            project_mode: ProjectMode::Credits,
            messages: &[user_message("hi")],
            tools: None,
            max_tokens: None,
            has_existing_tool_calls: false,
            stream: false,
            use_responses_api_env: false,
        };
        let tokenizer = default_tokenizer();
        let result = route(&req, registry::global(), &tokenizer, &NoKeys);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().error_type(), "payment_required");
    }

    #[test]
    fn explicit_provider_routes_with_env_token() {
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "sk-test-token");
        }
        let req = RouteRequest {
            model_input: "openai/gpt-5-nano",
            organization_id: "org_1",
            project_mode: ProjectMode::Credits,
            messages: &[user_message("hi")],
            tools: None,
            max_tokens: None,
            has_existing_tool_calls: false,
            stream: false,
            use_responses_api_env: false,
        };
        let tokenizer = default_tokenizer();
        let result = route(&req, registry::global(), &tokenizer, &NoKeys).unwrap();
        assert_eq!(result.used_provider, "openai");
        assert_eq!(result.key.token, "sk-test-token");
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
    }

    #[test]
    fn auto_requires_some_available_provider_and_resolves_deterministically() {
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "sk-test-token");
        }
        let req = RouteRequest {
            model_input: "auto",
            organization_id: "org_1",
            project_mode: ProjectMode::Credits,
            messages: &[user_message("hi")],
            tools: None,
            max_tokens: None,
            has_existing_tool_calls: false,
            stream: false,
            use_responses_api_env: false,
        };
        let tokenizer = default_tokenizer();
        let a = route(&req, registry::global(), &tokenizer, &NoKeys).unwrap();
        let b = route(&req, registry::global(), &tokenizer, &NoKeys).unwrap();
        assert_eq!(a.used_model, b.used_model);
        assert_eq!(a.used_provider, b.used_provider);
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
    }

    #[test]
    fn bare_custom_alone_is_rejected() {
        let req = RouteRequest {
            model_input: "custom",
            organization_id: "org_1",
            project_mode: ProjectMode::Hybrid,
            messages: &[user_message("hi")],
            tools: None,
            max_tokens: None,
            has_existing_tool_calls: false,
            stream: false,
            use_responses_api_env: false,
        };
        let tokenizer = default_tokenizer();
        let err = route(&req, registry::global(), &tokenizer, &NoKeys).unwrap_err();
        assert_eq!(err.error_type(), "invalid_request_error");
    }

    #[test]
    fn custom_provider_forbidden_in_pure_credits_mode() {
        let req = RouteRequest {
            model_input: "my-endpoint/llama-70b",
            organization_id: "org_1",
            project_mode: ProjectMode::Credits,
            messages: &[user_message("hi")],
            tools: None,
            max_tokens: None,
            has_existing_tool_calls: false,
            stream: false,
            use_responses_api_env: false,
        };
        let tokenizer = default_tokenizer();
        let err = route(&req, registry::global(), &tokenizer, &NoKeys).unwrap_err();
        assert_eq!(err.error_type(), "invalid_request_error");
    }
}
