//! `prepareRequestBody`: the single entry point that dispatches the
//! canonical request to the right provider-specific body-building
//! function (§4.3).

use serde_json::Value;

use gateway_core::ChatCompletionRequest;

use crate::Dialect;

/// Build the upstream request body for `dialect`.
#[must_use]
pub fn prepare_request_body(dialect: Dialect, req: &ChatCompletionRequest, model_name: &str) -> Value {
    match dialect {
        Dialect::Anthropic => crate::anthropic::build_request(req, model_name),
        Dialect::Google => crate::google::build_request(req),
        Dialect::OpenAiResponses => crate::openai::build_responses_request(req, model_name),
        Dialect::OpenAiChat | Dialect::Mistral => crate::openai::build_chat_request(req, model_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{ChatMessage, Content, Role};

    fn req() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "m".to_string(),
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
    fn dispatches_to_anthropic_builder() {
        let body = prepare_request_body(Dialect::Anthropic, &req(), "claude-sonnet-4-5-20250929");
        assert_eq!(body["model"], "claude-sonnet-4-5-20250929");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn dispatches_to_google_builder() {
        let body = prepare_request_body(Dialect::Google, &req(), "gemini-2.0-flash");
        assert!(body.get("contents").is_some());
    }

    #[test]
    fn dispatches_to_openai_chat_builder() {
        let body = prepare_request_body(Dialect::OpenAiChat, &req(), "gpt-5-nano");
        assert_eq!(body["model"], "gpt-5-nano");
    }
}
