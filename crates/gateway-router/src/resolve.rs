//! Model-string parsing, auto-selection, and multi-provider
//! disambiguation (§4.2).

use gateway_core::{ChatMessage, GatewayError, ProjectMode, Tool};
use gateway_tokenizer::Tokenizer;

use crate::keys::{CustomProviderRef, KeySource};
use crate::registry::{Model, ProviderMapping, Registry};

/// The default completion budget assumed when the caller doesn't supply
/// `max_tokens` (spec.md §4.2 "auto selection").
const DEFAULT_COMPLETION_BUDGET: u64 = 4096;

/// How a caller addressed a model (§4.2 "Syntaxes recognised").
#[derive(Debug, PartialEq, Eq)]
pub enum ModelSyntax<'a> {
    Auto,
    Custom,
    Provider { provider_id: &'a str, model_name: &'a str },
    CustomProvider { name: &'a str, model_name: &'a str },
    Bare(&'a str),
}

/// Parse the raw `model` field of the ingress body into its syntax.
#[must_use]
pub fn parse_model_syntax<'a>(input: &'a str, registry: &Registry) -> ModelSyntax<'a> {
    if input == "auto" {
        return ModelSyntax::Auto;
    }
    if input == "custom" {
        return ModelSyntax::Custom;
    }
    if let Some((head, rest)) = input.split_once('/') {
        if registry.provider(head).is_some() {
            return ModelSyntax::Provider {
                provider_id: head,
                model_name: rest,
            };
        }
        return ModelSyntax::CustomProvider {
            name: head,
            model_name: rest,
        };
    }
    ModelSyntax::Bare(input)
}

/// The outcome of resolving a model-string against the registry, before
/// upstream credentials are attached.
#[derive(Clone, Debug)]
pub struct ModelResolution {
    pub model_id: String,
    pub provider_id: String,
    pub mapping: ProviderMapping,
    /// True for `auto`/`custom` pseudo-model requests (used to populate
    /// `Log.requested_model`/`requested_provider` distinctly from
    /// `used_model`/`used_provider`).
    pub is_pseudo: bool,
}

/// Availability of providers under the project's current mode, used by
/// both `auto` selection and multi-provider disambiguation.
pub trait ProviderAvailability {
    fn is_available(&self, provider_id: &str) -> bool;
}

/// Required context-size budget for a request: prompt + tool definitions,
/// plus the requested (or default) completion budget.
#[must_use]
pub fn required_context_budget(
    tokenizer: &dyn Tokenizer,
    messages: &[ChatMessage],
    tools: Option<&[Tool]>,
    max_tokens: Option<u64>,
) -> u64 {
    tokenizer.count_messages(messages, tools) + max_tokens.unwrap_or(DEFAULT_COMPLETION_BUDGET)
}

/// Select the cheapest auto-eligible `(model, mapping)` pair whose
/// context size covers `required_budget`, restricted to providers
/// available under the project's mode. Falls back to the first
/// allow-listed model's default provider mapping when nothing fits.
pub fn select_auto(
    registry: &Registry,
    availability: &dyn ProviderAvailability,
    required_budget: u64,
) -> Result<ModelResolution, GatewayError> {
    let mut best: Option<(&Model, &ProviderMapping)> = None;

    for model_id in &registry.auto_eligible {
        let Some(model) = registry.model(model_id) else {
            continue;
        };
        if model.is_deactivated(chrono::Utc::now()) {
            continue;
        }
        for mapping in &model.providers {
            if !availability.is_available(mapping.provider_id) {
                continue;
            }
            if mapping.context_size < required_budget {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, current)) => mapping.average_price() < current.average_price(),
            };
            if better {
                best = Some((model, mapping));
            }
        }
    }

    if let Some((model, mapping)) = best {
        return Ok(ModelResolution {
            model_id: model.id.to_string(),
            provider_id: mapping.provider_id.to_string(),
            mapping: mapping.clone(),
            is_pseudo: true,
        });
    }

    // Nothing fit the budget: fall back to the first allow-listed model's
    // default (first-listed) provider mapping.
    let fallback_id = registry
        .auto_eligible
        .first()
        .ok_or_else(|| GatewayError::Internal("auto-eligible allow-list is empty".into()))?;
    let model = registry
        .model(fallback_id)
        .ok_or_else(|| GatewayError::Internal(format!("auto-eligible model '{fallback_id}' not in registry")))?;
    let mapping = model
        .providers
        .first()
        .ok_or_else(|| GatewayError::Internal(format!("model '{fallback_id}' has no provider mappings")))?;
    Ok(ModelResolution {
        model_id: model.id.to_string(),
        provider_id: mapping.provider_id.to_string(),
        mapping: mapping.clone(),
        is_pseudo: true,
    })
}

/// Resolve a model that was addressed as `providerId/modelName` directly.
pub fn resolve_explicit_provider(
    registry: &Registry,
    provider_id: &str,
    model_name: &str,
) -> Result<ModelResolution, GatewayError> {
    if registry.provider(provider_id).is_none() {
        return Err(GatewayError::invalid_request(format!("unknown provider '{provider_id}'")));
    }
    // The model-name component may itself contain slashes (spec.md §4.2).
    // Look for a registry model whose mapping name matches exactly under
    // this provider; if none is registered, treat `model_name` as a
    // passthrough to the upstream with a synthetic mapping using sane
    // defaults, mirroring the source gateway's tolerance for upstream
    // model ids the static registry doesn't enumerate.
    for model in registry.models_for_provider(provider_id) {
        if let Some(mapping) = model.mapping_for(provider_id) {
            if mapping.model_name.as_ref() == model_name {
                return Ok(ModelResolution {
                    model_id: model.id.to_string(),
                    provider_id: provider_id.to_string(),
                    mapping: mapping.clone(),
                    is_pseudo: false,
                });
            }
        }
    }
    Err(GatewayError::invalid_request(format!(
        "unknown model '{provider_id}/{model_name}'"
    )))
}

/// Resolve a bare model name (no explicit provider), disambiguating
/// across multiple provider mappings by availability then cheapest price
/// (§4.2 "Multi-provider disambiguation").
pub fn resolve_bare_model(
    registry: &Registry,
    availability: &dyn ProviderAvailability,
    model_name: &str,
) -> Result<ModelResolution, GatewayError> {
    let model = registry
        .model(model_name)
        .ok_or_else(|| GatewayError::invalid_request(format!("unknown model '{model_name}'")))?;

    if model.is_deactivated(chrono::Utc::now()) {
        return Err(GatewayError::Gone(format!("model '{model_name}' has been deactivated")));
    }

    let available: Vec<&ProviderMapping> = model
        .providers
        .iter()
        .filter(|m| availability.is_available(m.provider_id))
        .collect();

    let candidates: Vec<&ProviderMapping> = if available.is_empty() {
        // No provider is currently available; report with the full list
        // so the caller can pick one explicitly.
        model.providers.iter().collect()
    } else {
        available.clone()
    };

    if candidates.len() > 1 {
        let cheapest = candidates
            .iter()
            .min_by(|a, b| a.average_price().total_cmp(&b.average_price()))
            .expect("non-empty candidates");
        if available.len() > 1 {
            return Ok(ModelResolution {
                model_id: model.id.to_string(),
                provider_id: cheapest.provider_id.to_string(),
                mapping: (*cheapest).clone(),
                is_pseudo: false,
            });
        }
        let options: Vec<String> = model
            .providers
            .iter()
            .map(|m| format!("{}/{}", m.provider_id, m.model_name))
            .collect();
        return Err(GatewayError::invalid_request(format!(
            "model '{model_name}' is ambiguous; specify one of: {}",
            options.join(", ")
        )));
    }

    let mapping = candidates[0];
    Ok(ModelResolution {
        model_id: model.id.to_string(),
        provider_id: mapping.provider_id.to_string(),
        mapping: mapping.clone(),
        is_pseudo: false,
    })
}

/// Resolve a `<customProviderName>/<model>` reference against the
/// organization's registered custom providers.
pub fn resolve_custom_provider(
    organization_id: &str,
    name: &str,
    model_name: &str,
    key_source: &dyn KeySource,
) -> Result<(CustomProviderRef, ModelResolution), GatewayError> {
    let custom = key_source
        .custom_provider(organization_id, name)
        .ok_or_else(|| GatewayError::invalid_request(format!("unknown custom provider '{name}'")))?;

    let mapping = ProviderMapping {
        provider_id: "custom",
        model_name: std::borrow::Cow::Owned(model_name.to_string()),
        input_price: 0.0,
        output_price: 0.0,
        cached_input_price: None,
        request_price: None,
        context_size: u64::MAX,
        max_output: u64::MAX,
        streaming: true,
        vision: false,
        tools: true,
        reasoning: false,
        reasoning_output: crate::registry::ReasoningOutput::Emit,
        supports_responses_api: false,
        discount: 1.0,
        stability: None,
        zai_finish_reason_fixup: false,
    };

    Ok((
        custom,
        ModelResolution {
            model_id: model_name.to_string(),
            provider_id: "custom".to_string(),
            mapping,
            is_pseudo: false,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::global;

    struct AllAvailable;
    impl ProviderAvailability for AllAvailable {
        fn is_available(&self, _provider_id: &str) -> bool {
            true
        }
    }

    struct OnlyOpenAi;
    impl ProviderAvailability for OnlyOpenAi {
        fn is_available(&self, provider_id: &str) -> bool {
            provider_id == "openai"
        }
    }

    struct NoneAvailable;
    impl ProviderAvailability for NoneAvailable {
        fn is_available(&self, _provider_id: &str) -> bool {
            false
        }
    }

    #[test]
    fn parses_auto_and_custom() {
        let reg = global();
        assert_eq!(parse_model_syntax("auto", reg), ModelSyntax::Auto);
        assert_eq!(parse_model_syntax("custom", reg), ModelSyntax::Custom);
    }

    #[test]
    fn parses_explicit_provider() {
        let reg = global();
        assert_eq!(
            parse_model_syntax("openai/gpt-5-nano", reg),
            ModelSyntax::Provider {
                provider_id: "openai",
                model_name: "gpt-5-nano"
            }
        );
    }

    #[test]
    fn parses_custom_provider_name() {
        let reg = global();
        assert_eq!(
            parse_model_syntax("my-endpoint/llama-70b", reg),
            ModelSyntax::CustomProvider {
                name: "my-endpoint",
                model_name: "llama-70b"
            }
        );
    }

    #[test]
    fn parses_bare_model() {
        let reg = global();
        assert_eq!(parse_model_syntax("gpt-4o-mini", reg), ModelSyntax::Bare("gpt-4o-mini"));
    }

    #[test]
    fn auto_selects_cheapest_fitting_model() {
        let reg = global();
        let resolution = select_auto(reg, &AllAvailable, 1000).unwrap();
        assert!(reg.auto_eligible.contains(&resolution.model_id.as_str()));
        assert!(resolution.is_pseudo);
    }

    #[test]
    fn auto_falls_back_when_nothing_available() {
        let reg = global();
        let resolution = select_auto(reg, &NoneAvailable, 1000).unwrap();
        assert_eq!(resolution.model_id, reg.auto_eligible[0]);
    }

    #[test]
    fn explicit_provider_resolves_known_model() {
        let reg = global();
        let resolution = resolve_explicit_provider(reg, "openai", "gpt-5-nano").unwrap();
        assert_eq!(resolution.provider_id, "openai");
        assert!(!resolution.is_pseudo);
    }

    #[test]
    fn explicit_unknown_provider_rejected() {
        let reg = global();
        assert!(resolve_explicit_provider(reg, "not-a-provider", "x").is_err());
    }

    #[test]
    fn bare_model_single_provider_resolves_directly() {
        let reg = global();
        let resolution = resolve_bare_model(reg, &AllAvailable, "gpt-4o-mini").unwrap();
        assert_eq!(resolution.provider_id, "openai");
    }

    #[test]
    fn bare_model_multi_provider_picks_cheapest() {
        let reg = global();
        let resolution = resolve_bare_model(reg, &AllAvailable, "llama-3.3-70b").unwrap();
        // groq is cheaper than together in the registry's static prices.
        assert_eq!(resolution.provider_id, "groq");
    }

    #[test]
    fn bare_model_ambiguous_when_multiple_available_with_only_one_candidate_flag() {
        // With only one provider actually available, no ambiguity error —
        // the available one is chosen even if others exist in the registry.
        let reg = global();
        let resolution = resolve_bare_model(reg, &OnlyOpenAi, "gpt-4o-mini").unwrap();
        assert_eq!(resolution.provider_id, "openai");
    }

    #[test]
    fn deactivated_model_rejected_as_gone() {
        let reg = global();
        // Construct a small registry locally with a deactivated model
        // rather than mutating the static one.
        let mut model = reg.model("gpt-4o-mini").unwrap().clone();
        model.deactivated_at = Some(chrono::Utc::now() - chrono::Duration::days(1));
        let local = Registry {
            providers: reg.providers.clone(),
            models: vec![model],
            auto_eligible: reg.auto_eligible.clone(),
        };
        let err = resolve_bare_model(&local, &AllAvailable, "gpt-4o-mini").unwrap_err();
        assert_eq!(err.error_type(), "gone");
    }
}
