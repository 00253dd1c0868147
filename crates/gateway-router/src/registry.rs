//! The static provider/model registry (§3).
//!
//! Loaded once into process-wide statics rather than a runtime-mutable
//! global, per the REDESIGN FLAG in spec.md §9 ("Global mutable registries
//! ... should be immutable data loaded once"). Tests that need a
//! different registry construct their own [`Registry`] value instead of
//! mutating these statics.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};

/// A model's maturity/rollout stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Beta,
    Unstable,
    Experimental,
}

/// Whether a provider's dialect emits reasoning content to the caller or
/// swallows it upstream-side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasoningOutput {
    Emit,
    Omit,
}

/// One upstream registry entry (§3 `Provider`).
#[derive(Clone, Debug)]
pub struct Provider {
    pub id: &'static str,
    pub name: &'static str,
    pub streaming: bool,
    pub cancellation: bool,
    pub env_var: &'static str,
}

/// One `(providerId, modelName, pricing, limits, capabilities)` tuple
/// binding a model to one way to obtain it (§3 `ProviderMapping`).
#[derive(Clone, Debug)]
pub struct ProviderMapping {
    pub provider_id: &'static str,
    /// Borrowed for registry-literal mappings; owned when a model name is
    /// only known at request time (custom providers).
    pub model_name: Cow<'static, str>,
    pub input_price: f64,
    pub output_price: f64,
    pub cached_input_price: Option<f64>,
    pub request_price: Option<f64>,
    pub context_size: u64,
    pub max_output: u64,
    pub streaming: bool,
    pub vision: bool,
    pub tools: bool,
    pub reasoning: bool,
    pub reasoning_output: ReasoningOutput,
    pub supports_responses_api: bool,
    pub discount: f64,
    pub stability: Option<Stability>,
    /// Gates the Z.ai finish-reason fixup (spec.md §9 Open Question): a
    /// per-mapping flag rather than a hardcoded model-id list.
    pub zai_finish_reason_fixup: bool,
}

impl ProviderMapping {
    #[must_use]
    pub fn average_price(&self) -> f64 {
        (self.input_price + self.output_price) / 2.0
    }
}

/// One entry in the model registry (§3 `Model`).
#[derive(Clone, Debug)]
pub struct Model {
    pub id: &'static str,
    pub family: &'static str,
    pub providers: Vec<ProviderMapping>,
    pub stability: Option<Stability>,
    pub free: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub output: HashSet<&'static str>,
    pub json_output: bool,
}

impl Model {
    #[must_use]
    pub fn is_deactivated(&self, now: DateTime<Utc>) -> bool {
        self.deactivated_at.is_some_and(|at| at < now)
    }

    #[must_use]
    pub fn mapping_for(&self, provider_id: &str) -> Option<&ProviderMapping> {
        self.providers.iter().find(|p| p.provider_id == provider_id)
    }
}

/// The immutable provider+model registry.
pub struct Registry {
    pub providers: Vec<Provider>,
    pub models: Vec<Model>,
    /// Hardcoded allow-list of models eligible for `auto` selection,
    /// in priority order (spec.md §9 Open Question: "treat the list as
    /// configuration" — callers may substitute a different list by
    /// constructing their own `Registry`).
    pub auto_eligible: Vec<&'static str>,
}

impl Registry {
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    /// All models that list `provider_id` as one of their mappings.
    pub fn models_for_provider<'a>(&'a self, provider_id: &'a str) -> impl Iterator<Item = &'a Model> + 'a {
        self.models.iter().filter(move |m| m.mapping_for(provider_id).is_some())
    }
}

fn mapping(
    provider_id: &'static str,
    model_name: &'static str,
    input_price: f64,
    output_price: f64,
    context_size: u64,
    max_output: u64,
) -> ProviderMapping {
    ProviderMapping {
        provider_id,
        model_name: Cow::Borrowed(model_name),
        input_price,
        output_price,
        cached_input_price: None,
        request_price: None,
        context_size,
        max_output,
        streaming: true,
        vision: false,
        tools: true,
        reasoning: false,
        reasoning_output: ReasoningOutput::Emit,
        supports_responses_api: false,
        discount: 1.0,
        stability: None,
        zai_finish_reason_fixup: false,
    }
}

fn build_providers() -> Vec<Provider> {
    vec![
        Provider { id: "openai", name: "OpenAI", streaming: true, cancellation: true, env_var: "OPENAI_API_KEY" },
        Provider { id: "anthropic", name: "Anthropic", streaming: true, cancellation: true, env_var: "ANTHROPIC_API_KEY" },
        Provider { id: "google-ai-studio", name: "Google AI Studio", streaming: true, cancellation: true, env_var: "GOOGLE_AI_STUDIO_API_KEY" },
        Provider { id: "google-vertex", name: "Google Vertex", streaming: true, cancellation: true, env_var: "VERTEX_API_KEY" },
        Provider { id: "mistral", name: "Mistral", streaming: true, cancellation: true, env_var: "MISTRAL_API_KEY" },
        Provider { id: "groq", name: "Groq", streaming: true, cancellation: true, env_var: "GROQ_API_KEY" },
        Provider { id: "xai", name: "xAI", streaming: true, cancellation: true, env_var: "X_AI_API_KEY" },
        Provider { id: "deepseek", name: "DeepSeek", streaming: true, cancellation: true, env_var: "DEEPSEEK_API_KEY" },
        Provider { id: "perplexity", name: "Perplexity", streaming: true, cancellation: false, env_var: "PERPLEXITY_API_KEY" },
        Provider { id: "novita", name: "Novita", streaming: true, cancellation: true, env_var: "NOVITA_AI_API_KEY" },
        Provider { id: "moonshot", name: "Moonshot", streaming: true, cancellation: true, env_var: "MOONSHOT_API_KEY" },
        Provider { id: "alibaba", name: "Alibaba", streaming: true, cancellation: true, env_var: "ALIBABA_API_KEY" },
        Provider { id: "nebius", name: "Nebius", streaming: true, cancellation: true, env_var: "NEBIUS_API_KEY" },
        Provider { id: "zai", name: "Z.ai", streaming: true, cancellation: true, env_var: "Z_AI_API_KEY" },
        Provider { id: "together", name: "Together", streaming: true, cancellation: true, env_var: "TOGETHER_AI_API_KEY" },
        Provider { id: "cloudrift", name: "Cloudrift", streaming: true, cancellation: true, env_var: "CLOUD_RIFT_API_KEY" },
        Provider { id: "inference-net", name: "inference.net", streaming: true, cancellation: true, env_var: "INFERENCE_NET_API_KEY" },
        Provider { id: "routeway", name: "Routeway", streaming: true, cancellation: true, env_var: "LLMGATEWAY_API_KEY" },
        Provider { id: "llmgateway", name: "llmgateway", streaming: true, cancellation: false, env_var: "LLMGATEWAY_API_KEY" },
        Provider { id: "custom", name: "Custom", streaming: true, cancellation: true, env_var: "" },
    ]
}

fn build_models() -> Vec<Model> {
    vec![
        Model {
            id: "gpt-5-nano",
            family: "gpt-5",
            providers: vec![{
                let mut m = mapping("openai", "gpt-5-nano", 0.000_000_05, 0.000_000_40, 400_000, 128_000);
                m.reasoning = true;
                m.supports_responses_api = true;
                m
            }],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: true,
        },
        Model {
            id: "gpt-4.1-nano",
            family: "gpt-4.1",
            providers: vec![mapping("openai", "gpt-4.1-nano", 0.000_000_10, 0.000_000_40, 1_047_576, 32_768)],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: true,
        },
        Model {
            id: "gpt-4o-mini",
            family: "gpt-4o",
            providers: vec![mapping("openai", "gpt-4o-mini", 0.000_000_15, 0.000_000_60, 128_000, 16_384)],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
        Model {
            id: "claude-3-5-sonnet-20241022",
            family: "claude-3.5",
            providers: vec![{
                let mut m = mapping("anthropic", "claude-3-5-sonnet-20241022", 0.000_003, 0.000_015, 200_000, 8_192);
                m.vision = true;
                m
            }],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
        Model {
            id: "claude-sonnet-4-5",
            family: "claude-4",
            providers: vec![{
                let mut m = mapping("anthropic", "claude-sonnet-4-5-20250929", 0.000_003, 0.000_015, 200_000, 64_000);
                m.vision = true;
                m.reasoning = true;
                m
            }],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
        Model {
            id: "gemini-2.0-flash",
            family: "gemini-2.0",
            providers: vec![{
                let mut m = mapping("google-ai-studio", "gemini-2.0-flash", 0.000_000_10, 0.000_000_40, 1_048_576, 8_192);
                m.vision = true;
                let mut output = HashSet::new();
                let _ = output.insert("image");
                m.tools = true;
                m
            }],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: {
                let mut s = HashSet::new();
                let _ = s.insert("image");
                s
            },
            json_output: true,
        },
        Model {
            id: "mistral-small",
            family: "mistral",
            providers: vec![mapping("mistral", "mistral-small-latest", 0.000_000_20, 0.000_000_60, 128_000, 16_384)],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: true,
        },
        Model {
            id: "llama-3.3-70b",
            family: "llama-3.3",
            providers: vec![
                mapping("groq", "llama-3.3-70b-versatile", 0.000_000_59, 0.000_000_79, 128_000, 32_768),
                mapping("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo", 0.000_000_88, 0.000_000_88, 128_000, 4_096),
            ],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
        Model {
            id: "grok-2",
            family: "grok",
            providers: vec![mapping("xai", "grok-2-latest", 0.000_002, 0.000_010, 131_072, 8_192)],
            stability: Some(Stability::Beta),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
        Model {
            id: "deepseek-chat",
            family: "deepseek",
            providers: vec![{
                let mut m = mapping("deepseek", "deepseek-chat", 0.000_000_27, 0.000_001_10, 64_000, 8_192);
                m.cached_input_price = Some(0.000_000_07);
                m
            }],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: true,
        },
        Model {
            id: "glm-4.5-flash",
            family: "glm-4.5",
            providers: vec![{
                let mut m = mapping("zai", "glm-4.5-flash", 0.0, 0.0, 128_000, 8_192);
                m.zai_finish_reason_fixup = true;
                m
            }],
            stability: Some(Stability::Stable),
            free: true,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
        Model {
            id: "glm-4.5-airx",
            family: "glm-4.5",
            providers: vec![{
                let mut m = mapping("zai", "glm-4.5-airx", 0.000_001_10, 0.000_004_50, 128_000, 8_192);
                m.zai_finish_reason_fixup = true;
                m
            }],
            stability: Some(Stability::Stable),
            free: false,
            deactivated_at: None,
            output: HashSet::new(),
            json_output: false,
        },
    ]
}

/// The process-wide registry, built once and never mutated.
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        providers: build_providers(),
        models: build_models(),
        auto_eligible: vec!["gpt-5-nano", "gpt-4.1-nano"],
    })
}
