//! OpenAI-compatible dialect: the default wire shape most of the registry
//! speaks unchanged, plus the two OpenAI-specific variants this crate
//! must also understand: the Responses API (`/v1/responses`) and the
//! Z.ai `glm-4.5-airx`/`glm-4.5-flash` finish-reason fixup (§4.3).

use serde_json::{json, Value};

use gateway_core::{ChatCompletionChunk, ChatCompletionRequest, ChatMessage, Content, FinishReason, Role, ToolCall, ToolCallFunction};

use crate::response::{ParsedMessage, ParsedUsage};
use crate::sse::Frame;
use crate::stream::ToolCallAccumulator;

/// Build a chat-completions-shaped body. Pass-through for the large
/// majority of the registry: the canonical schema already *is* the
/// OpenAI chat-completions schema, so this just re-serializes it with
/// the resolved upstream model name substituted in.
#[must_use]
pub fn build_chat_request(req: &ChatCompletionRequest, model_name: &str) -> Value {
    let mut body = serde_json::to_value(req).expect("ChatCompletionRequest always serializes");
    if let Some(obj) = body.as_object_mut() {
        let _ = obj.insert("model".to_string(), json!(model_name));
    }
    body
}

/// Build an OpenAI Responses API body: `messages` become `input` items,
/// `max_tokens` becomes `max_output_tokens` (§4.2 endpoint construction,
/// §4.3 request construction).
#[must_use]
pub fn build_responses_request(req: &ChatCompletionRequest, model_name: &str) -> Value {
    let input: Vec<Value> = req
        .messages
        .iter()
        .map(|m| {
            json!({
                "role": role_str(m.role),
                "content": m.content.as_ref().map(Content::as_text).unwrap_or_default(),
            })
        })
        .collect();

    let mut body = json!({
        "model": model_name,
        "input": input,
        "stream": req.wants_stream(),
    });
    let obj = body.as_object_mut().expect("object literal");
    if let Some(max_tokens) = req.max_tokens {
        let _ = obj.insert("max_output_tokens".to_string(), json!(max_tokens));
    }
    if let Some(temperature) = req.temperature {
        let _ = obj.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(effort) = req.reasoning_effort {
        let _ = obj.insert(
            "reasoning".to_string(),
            json!({ "effort": serde_json::to_value(effort).unwrap() }),
        );
    }
    body
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Parse a standard OpenAI chat-completions (or fully compatible
/// provider's) non-streaming response.
///
/// `zai_fixup` gates the observed-upstream-misbehaviour workaround (§4.3,
/// §9 Open Question): when the last input message was a `tool` result and
/// the model still emitted fresh `tool_calls` with `finish_reason =
/// tool_calls`, the finish reason is rewritten to `stop` and the spurious
/// tool calls are dropped.
#[must_use]
pub fn parse_chat_response(body: &Value, zai_fixup: bool, last_input_was_tool_result: bool) -> (ParsedMessage, ParsedUsage) {
    let choice = body.get("choices").and_then(Value::as_array).and_then(|c| c.first());
    let message = choice.and_then(|c| c.get("message"));

    let content = message.and_then(|m| m.get("content")).and_then(Value::as_str).map(str::to_string);
    let reasoning_content = message
        .and_then(|m| m.get("reasoning_content").or_else(|| m.get("reasoning")))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut tool_calls = parse_tool_calls(message);

    let raw_finish_reason = choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str);
    let mut finish_reason = raw_finish_reason.map(map_finish_reason);

    if zai_fixup && last_input_was_tool_result && raw_finish_reason == Some("tool_calls") && !tool_calls.is_empty() {
        tool_calls.clear();
        finish_reason = Some(FinishReason::Stop);
    }

    let usage_obj = body.get("usage");
    let prompt_tokens = usage_obj.and_then(|u| u.get("prompt_tokens")).and_then(Value::as_u64);
    let completion_tokens = usage_obj.and_then(|u| u.get("completion_tokens")).and_then(Value::as_u64);
    let reasoning_tokens = usage_obj
        .and_then(|u| u.get("completion_tokens_details"))
        .and_then(|d| d.get("reasoning_tokens"))
        .and_then(Value::as_u64);
    let cached_tokens = usage_obj
        .and_then(|u| u.get("prompt_tokens_details"))
        .and_then(|d| d.get("cached_tokens"))
        .and_then(Value::as_u64);

    (
        ParsedMessage {
            content,
            reasoning_content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            images: None,
            finish_reason,
        },
        ParsedUsage {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens,
            cached_tokens,
        },
    )
}

fn parse_tool_calls(message: Option<&Value>) -> Vec<ToolCall> {
    message
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .map(|c| ToolCall {
                    id: c.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: c
                            .get("function")
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: c
                            .get("function")
                            .and_then(|f| f.get("arguments"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// True when the last message of the input history was a tool result —
/// the trigger condition for the Z.ai finish-reason fixup.
#[must_use]
pub fn last_message_was_tool_result(messages: &[ChatMessage]) -> bool {
    messages.last().is_some_and(|m| m.role == Role::Tool)
}

/// Parse an OpenAI Responses API non-streaming response: scan the
/// `output` array for the `message` item (content), the `reasoning`
/// item's `summary[0].text`, and any `function_call` items (tool calls).
#[must_use]
pub fn parse_responses_response(body: &Value) -> (ParsedMessage, ParsedUsage) {
    let mut content = None;
    let mut reasoning_content = None;
    let mut tool_calls = Vec::new();

    if let Some(output) = body.get("output").and_then(Value::as_array) {
        for item in output {
            match item.get("type").and_then(Value::as_str) {
                Some("message") => {
                    let text = item
                        .get("content")
                        .and_then(Value::as_array)
                        .and_then(|c| c.first())
                        .and_then(|c| c.get("text"))
                        .and_then(Value::as_str);
                    content = text.map(str::to_string);
                }
                Some("reasoning") => {
                    let text = item
                        .get("summary")
                        .and_then(Value::as_array)
                        .and_then(|s| s.first())
                        .and_then(|s| s.get("text"))
                        .and_then(Value::as_str);
                    reasoning_content = text.map(str::to_string);
                }
                Some("function_call") => {
                    tool_calls.push(ToolCall {
                        id: item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name: item.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                            arguments: item.get("arguments").and_then(Value::as_str).unwrap_or("{}").to_string(),
                        },
                    });
                }
                _ => {}
            }
        }
    }

    let status = body.get("status").and_then(Value::as_str);
    let finish_reason = Some(if !tool_calls.is_empty() {
        FinishReason::ToolCalls
    } else {
        match status {
            Some("completed") | None => FinishReason::Stop,
            Some("incomplete") => FinishReason::Length,
            _ => FinishReason::Stop,
        }
    });

    let usage_obj = body.get("usage");
    let prompt_tokens = usage_obj.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64);
    let completion_tokens = usage_obj.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64);
    let reasoning_tokens = usage_obj
        .and_then(|u| u.get("output_tokens_details"))
        .and_then(|d| d.get("reasoning_tokens"))
        .and_then(Value::as_u64);

    (
        ParsedMessage {
            content,
            reasoning_content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            images: None,
            finish_reason,
        },
        ParsedUsage {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens,
            cached_tokens: None,
        },
    )
}

/// Streaming state for standard OpenAI chat-completions (and every
/// OpenAI-compatible provider): forwards deltas near-verbatim, forcing
/// `object: "chat.completion.chunk"`, `delta.role: "assistant"`, and
/// renaming `reasoning` to `reasoning_content`.
#[derive(Default)]
pub struct ChatStreamState {
    tools: ToolCallAccumulator,
    tool_started: std::collections::BTreeSet<u32>,
    content_acc: String,
    usage_emitted: bool,
}

impl ChatStreamState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn accumulated_content(&self) -> &str {
        &self.content_acc
    }

    pub fn feed(&mut self, frame: &Frame, zai_fixup: bool, last_input_was_tool_result: bool) -> Option<ChatCompletionChunk> {
        let Ok(data): Result<Value, _> = serde_json::from_str(&frame.data) else {
            return None;
        };

        let id = data.get("id").and_then(Value::as_str).unwrap_or("").to_string();
        let model = data.get("model").and_then(Value::as_str).unwrap_or("").to_string();
        let created = data.get("created").and_then(Value::as_i64).unwrap_or(0);
        let mut chunk = ChatCompletionChunk::new(id, model, created);

        if let Some(usage) = data.get("usage") {
            let prompt_tokens = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let completion_tokens = usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
            let reasoning_tokens = usage
                .get("completion_tokens_details")
                .and_then(|d| d.get("reasoning_tokens"))
                .and_then(Value::as_u64);
            let mut canonical = gateway_core::Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: 0,
                reasoning_tokens,
                prompt_tokens_details: None,
            };
            canonical.recompute_total();
            chunk.usage = Some(canonical);
            self.usage_emitted = true;
        }

        let choice = data.get("choices").and_then(Value::as_array).and_then(|c| c.first());
        let delta_obj = choice.and_then(|c| c.get("delta"));
        let content = delta_obj.and_then(|d| d.get("content")).and_then(Value::as_str);
        let reasoning = delta_obj
            .and_then(|d| d.get("reasoning_content").or_else(|| d.get("reasoning")))
            .and_then(Value::as_str);
        let raw_finish_reason = choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str);

        let mut tool_call_deltas = Vec::new();
        if let Some(calls) = delta_obj.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                let id = call.get("id").and_then(Value::as_str);
                let name = call
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str);
                let arguments = call
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str);
                if let (Some(id), Some(name)) = (id, name) {
                    let _ = self.tool_started.insert(index);
                    tool_call_deltas.push(self.tools.start(index, id, name).delta.tool_calls.unwrap().remove(0));
                } else if let Some(arguments) = arguments {
                    tool_call_deltas.push(self.tools.delta(index, arguments).delta.tool_calls.unwrap().remove(0));
                }
            }
        }

        let mut finish_reason = raw_finish_reason.map(map_finish_reason);
        let dropped_for_zai = zai_fixup
            && last_input_was_tool_result
            && raw_finish_reason == Some("tool_calls")
            && !tool_call_deltas.is_empty();
        if dropped_for_zai {
            tool_call_deltas.clear();
            finish_reason = Some(FinishReason::Stop);
        }

        if let Some(c) = content {
            self.content_acc.push_str(c);
        }

        let has_payload = content.is_some() || reasoning.is_some() || !tool_call_deltas.is_empty() || finish_reason.is_some();
        if !has_payload && chunk.usage.is_none() {
            return None;
        }

        chunk.choices.push(gateway_core::ChunkChoice {
            index: 0,
            delta: gateway_core::Delta {
                role: Some(Role::Assistant),
                content: content.map(str::to_string),
                reasoning_content: reasoning.map(str::to_string),
                tool_calls: (!tool_call_deltas.is_empty()).then_some(tool_call_deltas),
                images: None,
            },
            finish_reason,
        });
        Some(chunk)
    }

    #[must_use]
    pub fn usage_emitted(&self) -> bool {
        self.usage_emitted
    }

    pub fn mark_usage_emitted(&mut self) {
        self.usage_emitted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::Content as Cnt;

    fn req(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-5-nano".to_string(),
            messages,
            temperature: None,
            max_tokens: Some(100),
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

    fn msg(role: Role, text: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: Some(Cnt::Text(text.to_string())),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
            images: None,
        }
    }

    #[test]
    fn chat_request_substitutes_upstream_model_name() {
        let body = build_chat_request(&req(vec![msg(Role::User, "hi")]), "gpt-5-nano-2025");
        assert_eq!(body["model"], "gpt-5-nano-2025");
    }

    #[test]
    fn responses_request_translates_max_tokens() {
        let body = build_responses_request(&req(vec![msg(Role::User, "hi")]), "gpt-5-nano");
        assert_eq!(body["max_output_tokens"], 100);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["input"][0]["role"], "user");
    }

    #[test]
    fn parses_standard_chat_response() {
        let body = json!({
            "choices": [{"message": {"content": "hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        });
        let (message, usage) = parse_chat_response(&body, false, false);
        assert_eq!(message.content.as_deref(), Some("hi"));
        assert_eq!(usage.prompt_tokens, Some(10));
    }

    #[test]
    fn zai_fixup_drops_spurious_tool_calls_after_tool_result() {
        let body = json!({
            "choices": [{
                "message": {"tool_calls": [{"id": "x", "function": {"name": "f", "arguments": "{}"}}]},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        });
        let (message, _) = parse_chat_response(&body, true, true);
        assert!(message.tool_calls.is_none());
        assert_eq!(message.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn zai_fixup_not_applied_without_prior_tool_result() {
        let body = json!({
            "choices": [{
                "message": {"tool_calls": [{"id": "x", "function": {"name": "f", "arguments": "{}"}}]},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        });
        let (message, _) = parse_chat_response(&body, true, false);
        assert!(message.tool_calls.is_some());
    }

    #[test]
    fn parses_responses_api_message_and_reasoning() {
        let body = json!({
            "status": "completed",
            "output": [
                {"type": "reasoning", "summary": [{"text": "thinking"}]},
                {"type": "message", "content": [{"text": "hello"}]}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let (message, usage) = parse_responses_response(&body);
        assert_eq!(message.content.as_deref(), Some("hello"));
        assert_eq!(message.reasoning_content.as_deref(), Some("thinking"));
        assert_eq!(usage.prompt_tokens, Some(10));
    }

    #[test]
    fn parses_responses_api_function_call() {
        let body = json!({
            "status": "completed",
            "output": [{"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}]
        });
        let (message, _) = parse_responses_response(&body);
        assert_eq!(message.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(message.tool_calls.unwrap()[0].function.name, "get_weather");
    }

    #[test]
    fn stream_forwards_content_delta_with_assistant_role() {
        let mut state = ChatStreamState::new();
        let chunk = state
            .feed(
                &Frame {
                    event: None,
                    data: r#"{"id":"1","model":"gpt-5-nano","created":0,"choices":[{"delta":{"content":"Hi"}}]}"#.into(),
                },
                false,
                false,
            )
            .unwrap();
        assert_eq!(chunk.choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
        assert_eq!(state.accumulated_content(), "Hi");
    }

    #[test]
    fn stream_renames_reasoning_field() {
        let mut state = ChatStreamState::new();
        let chunk = state
            .feed(
                &Frame {
                    event: None,
                    data: r#"{"id":"1","model":"m","created":0,"choices":[{"delta":{"reasoning":"thinking"}}]}"#.into(),
                },
                false,
                false,
            )
            .unwrap();
        assert_eq!(chunk.choices[0].delta.reasoning_content.as_deref(), Some("thinking"));
    }

    #[test]
    fn stream_carries_usage_once() {
        let mut state = ChatStreamState::new();
        let chunk = state
            .feed(
                &Frame {
                    event: None,
                    data: r#"{"id":"1","model":"m","created":0,"choices":[{"delta":{}}],"usage":{"prompt_tokens":10,"completion_tokens":2}}"#.into(),
                },
                false,
                false,
            )
            .unwrap();
        assert!(chunk.usage.is_some());
        assert!(state.usage_emitted());
    }

    #[test]
    fn last_message_was_tool_result_detects_trailing_tool_message() {
        let mut tool_msg = msg(Role::Tool, "42");
        tool_msg.tool_call_id = Some("call_1".to_string());
        assert!(last_message_was_tool_result(&[msg(Role::User, "hi"), tool_msg]));
        assert!(!last_message_was_tool_result(&[msg(Role::User, "hi")]));
    }
}
