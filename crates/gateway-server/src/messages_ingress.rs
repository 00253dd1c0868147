//! `POST /v1/messages` (§6 "Secondary ingress"): accepts the Anthropic
//! Messages API shape, rewrites it into the canonical ingress body, and
//! dispatches through the same non-streaming pipeline as
//! `/v1/chat/completions`. Streaming is not implemented for this adapter.

use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use gateway_core::wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Content, ContentPart, FinishReason, Role, Tool, ToolCall, ToolCallFunction, ToolFunction};
use gateway_core::GatewayError;

use crate::error_response::ApiError;
use crate::handlers::{admit, extract_or_generate_request_id, one_shot_chat_completion};
use crate::state::AppState;

/// The Anthropic Messages API request body.
#[derive(Deserialize)]
pub struct AnthropicRequest {
    pub model: String,
    #[serde(default)]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<AnthropicTool>>,
}

#[derive(Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: AnthropicToolResultContent },
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum AnthropicToolResultContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
}

/// The Anthropic Messages API response body.
#[derive(Serialize)]
pub struct AnthropicResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub role: &'static str,
    pub model: String,
    pub content: Vec<AnthropicResponseBlock>,
    pub stop_reason: Option<&'static str>,
    pub usage: AnthropicUsage,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Serialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// `POST /v1/messages`.
pub async fn messages(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<AnthropicRequest>) -> Response {
    if request.stream.unwrap_or(false) {
        return ApiError(GatewayError::invalid_request("streaming is not implemented for the /v1/messages adapter")).into_response();
    }

    let request_id = extract_or_generate_request_id(&headers);
    let started = Instant::now();
    let canonical = to_canonical_request(request);

    let admitted = match admit(&state, &headers, &canonical, &request_id, started) {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };

    match one_shot_chat_completion(&state, &admitted, &canonical, &request_id, started).await {
        Ok(response) => Json(from_canonical_response(response)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// Rewrite an Anthropic Messages request into the canonical ingress
/// shape: `system` becomes a leading `system` message, `tool_use`/
/// `tool_result` blocks become canonical `assistant.tool_calls`/`tool`
/// messages.
#[must_use]
pub fn to_canonical_request(request: AnthropicRequest) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system {
        messages.push(ChatMessage {
            role: Role::System,
            content: Some(Content::Text(system)),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
            images: None,
        });
    }
    for message in request.messages {
        messages.extend(to_canonical_messages(message));
    }

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| Tool {
                kind: "function".to_string(),
                function: ToolFunction {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.input_schema,
                },
            })
            .collect()
    });

    ChatCompletionRequest {
        model: request.model,
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        frequency_penalty: None,
        presence_penalty: None,
        response_format: None,
        stream: Some(false),
        tools,
        tool_choice: None,
        reasoning_effort: None,
    }
}

/// One Anthropic message may expand into more than one canonical message:
/// a `tool_result` block always becomes its own `role: tool` message, since
/// the canonical schema has no concept of mixed tool-result/text content
/// in a single message.
fn to_canonical_messages(message: AnthropicMessage) -> Vec<ChatMessage> {
    let role = match message.role.as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    match message.content {
        AnthropicContent::Text(text) => vec![ChatMessage {
            role,
            content: Some(Content::Text(text)),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
            images: None,
        }],
        AnthropicContent::Blocks(blocks) => {
            let mut out = Vec::new();
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for block in blocks {
                match block {
                    AnthropicContentBlock::Text { text } => text_parts.push(ContentPart::Text { text }),
                    AnthropicContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                        id,
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name,
                            arguments: input.to_string(),
                        },
                    }),
                    AnthropicContentBlock::ToolResult { tool_use_id, content } => out.push(ChatMessage {
                        role: Role::Tool,
                        content: Some(Content::Text(tool_result_text(content))),
                        name: None,
                        tool_call_id: Some(tool_use_id),
                        tool_calls: None,
                        reasoning_content: None,
                        images: None,
                    }),
                }
            }

            if !text_parts.is_empty() || !tool_calls.is_empty() {
                out.insert(
                    0,
                    ChatMessage {
                        role,
                        content: (!text_parts.is_empty()).then_some(Content::Parts(text_parts)),
                        name: None,
                        tool_call_id: None,
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        reasoning_content: None,
                        images: None,
                    },
                );
            }
            out
        }
    }
}

fn tool_result_text(content: AnthropicToolResultContent) -> String {
    match content {
        AnthropicToolResultContent::Text(text) => text,
        AnthropicToolResultContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

/// Rewrite a canonical response back into Anthropic Messages shape.
#[must_use]
pub fn from_canonical_response(response: ChatCompletionResponse) -> AnthropicResponse {
    let choice = response.choices.into_iter().next();
    let mut content = Vec::new();

    if let Some(choice) = &choice {
        if let Some(text) = choice.message.content.as_ref().map(Content::as_text) {
            if !text.is_empty() {
                content.push(AnthropicResponseBlock::Text { text });
            }
        }
        if let Some(tool_calls) = &choice.message.tool_calls {
            for call in tool_calls {
                let input = serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);
                content.push(AnthropicResponseBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input,
                });
            }
        }
    }

    AnthropicResponse {
        id: response.id,
        kind: "message",
        role: "assistant",
        model: response.model,
        content,
        stop_reason: choice.and_then(|c| c.finish_reason).map(map_stop_reason),
        usage: AnthropicUsage {
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
        },
    }
}

/// `finish_reason → stop_reason`: `stop→end_turn`, `length→max_tokens`,
/// `tool_calls→tool_use`. `content_filter`/`canceled` have no direct
/// Anthropic equivalent and fall back to `end_turn`.
#[must_use]
pub fn map_stop_reason(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter | FinishReason::Canceled => "end_turn",
    }
}
