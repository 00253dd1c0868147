//! The dialect adapter (C3): translates the canonical chat-completions
//! request/response shape to and from each provider's wire format, in
//! both one-shot and streaming modes (§4.3).
//!
//! Every provider reduces to one of five wire grammars. [`Dialect`] names
//! the grammar; [`DialectMapping`] pairs it with the one per-mapping flag
//! that changes parsing behaviour (the Z.ai finish-reason fixup). Callers
//! build requests via [`request::prepare_request_body`], parse one-shot
//! responses via [`parse_provider_response`], and drive streams via
//! [`pipeline::StreamPipeline`].

pub mod anthropic;
pub mod google;
pub mod mistral;
pub mod openai;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod responses_stream;
pub mod sse;
pub mod stream;

use gateway_core::{ChatCompletionResponse, ChatMessage, Tool};
use gateway_tokenizer::Tokenizer;
use serde_json::Value;

pub use request::prepare_request_body;
pub use response::{finalize, ParsedMessage, ParsedUsage};

/// Which wire grammar a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    OpenAiChat,
    OpenAiResponses,
    Anthropic,
    Google,
    Mistral,
}

impl Dialect {
    /// The grammar a provider speaks, given whether this particular
    /// request was routed to the Responses API (§4.2 "Endpoint
    /// construction").
    #[must_use]
    pub fn for_provider(provider_id: &str, is_responses_api: bool) -> Self {
        match provider_id {
            "anthropic" => Dialect::Anthropic,
            "google-ai-studio" | "google-vertex" => Dialect::Google,
            "mistral" => Dialect::Mistral,
            "openai" if is_responses_api => Dialect::OpenAiResponses,
            _ => Dialect::OpenAiChat,
        }
    }
}

/// A [`Dialect`] plus the one per-mapping behavioural flag that changes
/// how its responses are parsed (spec.md §9 Open Question: the Z.ai
/// fixup is gated per `ProviderMapping`, not a hardcoded model-id list).
#[derive(Clone, Copy, Debug)]
pub struct DialectMapping {
    pub dialect: Dialect,
    pub zai_finish_reason_fixup: bool,
}

/// `parseProviderResponse`: parse one upstream non-streaming response
/// body into the canonical [`ChatCompletionResponse`], dispatching to the
/// right provider parser and then applying the shared token-accounting
/// rules (§4.3). Returns whether the usage figures were filled by the
/// local tokenizer rather than reported by upstream, alongside the
/// response.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn parse_provider_response(
    dialect: DialectMapping,
    body: &Value,
    tokenizer: &dyn Tokenizer,
    id: String,
    created: i64,
    model: String,
    input_messages: &[ChatMessage],
    input_tools: Option<&[Tool]>,
    last_input_was_tool_result: bool,
) -> (ChatCompletionResponse, bool) {
    let (message, usage) = match dialect.dialect {
        Dialect::Anthropic => anthropic::parse_response(body),
        Dialect::Google => google::parse_response(body, tokenizer),
        Dialect::Mistral => mistral::parse_response(body),
        Dialect::OpenAiResponses => openai::parse_responses_response(body),
        Dialect::OpenAiChat => openai::parse_chat_response(body, dialect.zai_finish_reason_fixup, last_input_was_tool_result),
    };
    finalize(id, created, model, message, usage, tokenizer, input_messages, input_tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{Content, Role};
    use gateway_tokenizer::default_tokenizer;

    fn user_message() -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: Some(Content::Text("hi".to_string())),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
            images: None,
        }
    }

    #[test]
    fn dialect_for_provider_picks_anthropic() {
        assert_eq!(Dialect::for_provider("anthropic", false), Dialect::Anthropic);
    }

    #[test]
    fn dialect_for_provider_picks_openai_responses_only_when_eligible() {
        assert_eq!(Dialect::for_provider("openai", true), Dialect::OpenAiResponses);
        assert_eq!(Dialect::for_provider("openai", false), Dialect::OpenAiChat);
    }

    #[test]
    fn dialect_for_unknown_provider_defaults_to_openai_chat() {
        assert_eq!(Dialect::for_provider("groq", false), Dialect::OpenAiChat);
    }

    #[test]
    fn parse_provider_response_floors_prompt_tokens_at_one() {
        let mapping = DialectMapping {
            dialect: Dialect::OpenAiChat,
            zai_finish_reason_fixup: false,
        };
        let body = serde_json::json!({
            "choices": [{"message": {"content": "OK"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 0, "completion_tokens": 1}
        });
        let tokenizer = default_tokenizer();
        let (response, estimated) = parse_provider_response(
            mapping,
            &body,
            &tokenizer,
            "resp_1".to_string(),
            0,
            "gpt-5-nano".to_string(),
            &[user_message()],
            None,
            false,
        );
        assert!(response.usage.prompt_tokens >= 1);
        assert_eq!(
            response.usage.total_tokens,
            response.usage.prompt_tokens + response.usage.completion_tokens
        );
        assert!(!estimated);
    }

    #[test]
    fn parse_provider_response_dispatches_to_anthropic() {
        let mapping = DialectMapping {
            dialect: Dialect::Anthropic,
            zai_finish_reason_fixup: false,
        };
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "Hi there"}],
            "usage": {"input_tokens": 5, "output_tokens": 2}
        });
        let tokenizer = default_tokenizer();
        let (response, _) = parse_provider_response(
            mapping,
            &body,
            &tokenizer,
            "resp_2".to_string(),
            0,
            "claude-sonnet-4-5".to_string(),
            &[user_message()],
            None,
            false,
        );
        assert_eq!(response.choices[0].message.content.as_ref().map(gateway_core::Content::as_text), Some("Hi there".to_string()));
    }

    #[test]
    fn parse_provider_response_marks_estimated_when_usage_is_missing() {
        let mapping = DialectMapping {
            dialect: Dialect::OpenAiChat,
            zai_finish_reason_fixup: false,
        };
        let body = serde_json::json!({
            "choices": [{"message": {"content": "OK"}, "finish_reason": "stop"}]
        });
        let tokenizer = default_tokenizer();
        let (_, estimated) = parse_provider_response(
            mapping,
            &body,
            &tokenizer,
            "resp_3".to_string(),
            0,
            "gpt-5-nano".to_string(),
            &[user_message()],
            None,
            false,
        );
        assert!(estimated);
    }
}
