//! Endpoint construction (§4.2 "Endpoint construction"): a pure function
//! of `(provider, baseUrl?, modelName, token?, stream, supportsReasoning,
//! hasExistingToolCalls)`.

/// A fully-formed request target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    /// True when this endpoint is the OpenAI Responses API rather than
    /// chat-completions (changes request/response shape in the dialect
    /// adapter).
    pub is_responses_api: bool,
}

/// Build the upstream URL for one request.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn build_endpoint(
    provider_id: &str,
    base_url: Option<&str>,
    model_name: &str,
    token: Option<&str>,
    stream: bool,
    use_responses_api_env: bool,
    supports_reasoning: bool,
    supports_responses_api: bool,
    has_existing_tool_calls: bool,
) -> Endpoint {
    let base = base_url.unwrap_or_else(|| default_base_url(provider_id));

    match provider_id {
        "anthropic" => Endpoint {
            url: format!("{base}/v1/messages"),
            is_responses_api: false,
        },
        "google-ai-studio" | "google-vertex" => {
            let method = if stream {
                "streamGenerateContent"
            } else {
                "generateContent"
            };
            let key = token.unwrap_or_default();
            let sse = if stream { "&alt=sse" } else { "" };
            Endpoint {
                url: format!("{base}/v1beta/models/{model_name}:{method}?key={key}{sse}"),
                is_responses_api: false,
            }
        }
        "openai" => {
            if use_responses_api_env && supports_reasoning && supports_responses_api && !has_existing_tool_calls {
                Endpoint {
                    url: format!("{base}/v1/responses"),
                    is_responses_api: true,
                }
            } else {
                Endpoint {
                    url: format!("{base}/v1/chat/completions"),
                    is_responses_api: false,
                }
            }
        }
        "zai" => Endpoint {
            url: format!("{base}/api/paas/v4/chat/completions"),
            is_responses_api: false,
        },
        "perplexity" | "novita" => Endpoint {
            url: format!("{base}/chat/completions"),
            is_responses_api: false,
        },
        _ => Endpoint {
            url: format!("{base}/v1/chat/completions"),
            is_responses_api: false,
        },
    }
}

fn default_base_url(provider_id: &str) -> &'static str {
    match provider_id {
        "openai" => "https://api.openai.com",
        "anthropic" => "https://api.anthropic.com",
        "google-ai-studio" => "https://generativelanguage.googleapis.com",
        "google-vertex" => "https://vertexai.googleapis.com",
        "mistral" => "https://api.mistral.ai",
        "groq" => "https://api.groq.com/openai",
        "xai" => "https://api.x.ai",
        "deepseek" => "https://api.deepseek.com",
        "perplexity" => "https://api.perplexity.ai",
        "novita" => "https://api.novita.ai/v3/openai",
        "moonshot" => "https://api.moonshot.cn",
        "alibaba" => "https://dashscope.aliyuncs.com/compatible-mode",
        "nebius" => "https://api.studio.nebius.ai",
        "zai" => "https://open.bigmodel.cn",
        "together" => "https://api.together.xyz",
        "cloudrift" => "https://inference.cloudrift.ai",
        "inference-net" => "https://api.inference.net",
        "routeway" | "llmgateway" => "https://api.routeway.ai",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_endpoint_is_messages() {
        let ep = build_endpoint("anthropic", None, "claude-3-5-sonnet-20241022", None, false, false, false, false, false);
        assert_eq!(ep.url, "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn google_streaming_adds_sse_param() {
        let ep = build_endpoint(
            "google-ai-studio",
            None,
            "gemini-2.0-flash",
            Some("abc123"),
            true,
            false,
            false,
            false,
            false,
        );
        assert_eq!(
            ep.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?key=abc123&alt=sse"
        );
    }

    #[test]
    fn google_non_streaming_no_sse_param() {
        let ep = build_endpoint(
            "google-ai-studio",
            None,
            "gemini-2.0-flash",
            Some("abc123"),
            false,
            false,
            false,
            false,
            false,
        );
        assert!(!ep.url.contains("alt=sse"));
        assert!(ep.url.contains(":generateContent"));
    }

    #[test]
    fn openai_defaults_to_chat_completions() {
        let ep = build_endpoint("openai", None, "gpt-5-nano", None, false, false, true, true, false);
        assert_eq!(ep.url, "https://api.openai.com/v1/chat/completions");
        assert!(!ep.is_responses_api);
    }

    #[test]
    fn openai_uses_responses_api_when_eligible() {
        let ep = build_endpoint("openai", None, "gpt-5-nano", None, false, true, true, true, false);
        assert_eq!(ep.url, "https://api.openai.com/v1/responses");
        assert!(ep.is_responses_api);
    }

    #[test]
    fn openai_skips_responses_api_with_prior_tool_calls() {
        let ep = build_endpoint("openai", None, "gpt-5-nano", None, false, true, true, true, true);
        assert!(!ep.is_responses_api);
    }

    #[test]
    fn openai_skips_responses_api_when_model_lacks_support() {
        let ep = build_endpoint("openai", None, "gpt-4o-mini", None, false, true, false, false, false);
        assert!(!ep.is_responses_api);
    }

    #[test]
    fn zai_uses_paas_path() {
        let ep = build_endpoint("zai", None, "glm-4.5-flash", None, false, false, false, false, false);
        assert_eq!(ep.url, "https://open.bigmodel.cn/api/paas/v4/chat/completions");
    }

    #[test]
    fn perplexity_uses_short_path() {
        let ep = build_endpoint("perplexity", None, "sonar", None, false, false, false, false, false);
        assert_eq!(ep.url, "https://api.perplexity.ai/chat/completions");
    }

    #[test]
    fn custom_base_url_overrides_default() {
        let ep = build_endpoint(
            "custom",
            Some("https://my-llm.example.com"),
            "llama-70b",
            None,
            false,
            false,
            false,
            false,
            false,
        );
        assert_eq!(ep.url, "https://my-llm.example.com/v1/chat/completions");
    }
}
