//! Anthropic Messages API dialect: request shaping, non-streaming
//! response parsing, and the streaming content-block state machine
//! (§4.3).

use serde_json::{json, Value};

use gateway_core::{ChatCompletionChunk, ChatCompletionRequest, ChatMessage, Content, ContentPart, FinishReason, Role, ToolCall, ToolCallFunction};

use crate::response::{ParsedMessage, ParsedUsage};
use crate::sse::Frame;
use crate::stream::ToolCallAccumulator;

/// Build an Anthropic Messages API request body: `system` pulled to the
/// top level, tool results/tool calls rewritten into Anthropic's
/// `tool_result`/`tool_use` content blocks.
#[must_use]
pub fn build_request(req: &ChatCompletionRequest, model_name: &str) -> Value {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();

    for message in &req.messages {
        match message.role {
            Role::System => {
                if let Some(content) = &message.content {
                    system_parts.push(content.as_text());
                }
            }
            Role::Tool => {
                let tool_call_id = message.tool_call_id.clone().unwrap_or_default();
                let content_text = message.content.as_ref().map(Content::as_text).unwrap_or_default();
                messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": tool_call_id,
                        "content": content_text,
                    }]
                }));
            }
            Role::User => {
                messages.push(json!({
                    "role": "user",
                    "content": content_blocks(message.content.as_ref()),
                }));
            }
            Role::Assistant => {
                let mut blocks = content_blocks(message.content.as_ref());
                if let Some(tool_calls) = &message.tool_calls {
                    for call in tool_calls {
                        let input: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Object(serde_json::Map::new()));
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.function.name,
                            "input": input,
                        }));
                    }
                }
                messages.push(json!({ "role": "assistant", "content": blocks }));
            }
        }
    }

    let mut body = json!({
        "model": model_name,
        "messages": messages,
        "max_tokens": req.max_tokens.unwrap_or(4096),
        "stream": req.wants_stream(),
    });
    let obj = body.as_object_mut().expect("object literal");
    if !system_parts.is_empty() {
        let _ = obj.insert("system".to_string(), Value::String(system_parts.join("\n\n")));
    }
    if let Some(temperature) = req.temperature {
        let _ = obj.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = req.top_p {
        let _ = obj.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(tools) = &req.tools {
        let anthropic_tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "input_schema": t.function.parameters.clone().unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                })
            })
            .collect();
        let _ = obj.insert("tools".to_string(), Value::Array(anthropic_tools));
    }
    body
}

fn content_blocks(content: Option<&Content>) -> Vec<Value> {
    match content {
        None => Vec::new(),
        Some(Content::Text(text)) => vec![json!({"type": "text", "text": text})],
        Some(Content::Parts(parts)) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::ImageUrl { image_url } => json!({
                    "type": "image",
                    "source": {"type": "url", "url": image_url.url},
                }),
            })
            .collect(),
    }
}

/// Parse a non-streaming Anthropic response into the shared
/// (message, usage) shape.
#[must_use]
pub fn parse_response(body: &Value) -> (ParsedMessage, ParsedUsage) {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    if let Some(blocks) = body.get("content").and_then(Value::as_array) {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    content.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
                }
                Some("thinking") => {
                    reasoning.push_str(block.get("thinking").and_then(Value::as_str).unwrap_or(""));
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                    let input = block.get("input").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
                    tool_calls.push(ToolCall {
                        id,
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name,
                            arguments: input.to_string(),
                        },
                    });
                }
                _ => {}
            }
        }
    }

    let stop_reason = body.get("stop_reason").and_then(Value::as_str);
    let finish_reason = stop_reason.map(map_stop_reason);

    let usage_obj = body.get("usage");
    let prompt_tokens = usage_obj.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64);
    let output_tokens = usage_obj.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64);
    let reasoning_tokens = usage_obj.and_then(|u| u.get("reasoning_output_tokens")).and_then(Value::as_u64);
    let cached_tokens = usage_obj.and_then(|u| u.get("cache_read_input_tokens")).and_then(Value::as_u64);

    (
        ParsedMessage {
            content: (!content.is_empty()).then_some(content),
            reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            images: None,
            finish_reason,
        },
        ParsedUsage {
            prompt_tokens,
            completion_tokens: output_tokens,
            reasoning_tokens,
            cached_tokens,
        },
    )
}

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Streaming state machine over Anthropic's content-block events,
/// matching tool-call argument deltas by block index and accumulating
/// text/thinking per block.
#[derive(Default)]
pub struct StreamState {
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: Option<u64>,
    current_block_type: Option<String>,
    current_index: Option<u32>,
    tools: ToolCallAccumulator,
    content_acc: String,
    reasoning_acc: String,
    usage_emitted: bool,
}

impl StreamState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn accumulated_content(&self) -> &str {
        &self.content_acc
    }

    /// Process one reassembled frame, returning zero or more canonical
    /// chunks plus whether the stream has reached its terminal event.
    pub fn feed(&mut self, frame: &Frame, id: &str, model: &str, created: i64) -> (Vec<ChatCompletionChunk>, bool) {
        let event_type = frame.event.as_deref().unwrap_or("");
        let Ok(data): Result<Value, _> = serde_json::from_str(&frame.data) else {
            return (Vec::new(), false);
        };

        let mut chunks = Vec::new();
        let mut terminal = false;

        match event_type {
            "message_start" => {
                if let Some(usage) = data.get("message").and_then(|m| m.get("usage")) {
                    self.input_tokens = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                    self.cache_read_tokens = usage.get("cache_read_input_tokens").and_then(Value::as_u64);
                }
            }
            "content_block_start" => {
                let index = data.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                self.current_index = Some(index);
                let block = data.get("content_block");
                match block.and_then(|b| b.get("type")).and_then(Value::as_str) {
                    Some("tool_use") => {
                        self.current_block_type = Some("tool_use".to_string());
                        let tool_id = block.and_then(|b| b.get("id")).and_then(Value::as_str).unwrap_or_default();
                        let name = block.and_then(|b| b.get("name")).and_then(Value::as_str).unwrap_or_default();
                        let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
                        chunk.choices.push(self.tools.start(index, tool_id, name));
                        chunks.push(chunk);
                    }
                    Some("thinking") => self.current_block_type = Some("thinking".to_string()),
                    _ => self.current_block_type = Some("text".to_string()),
                }
            }
            "content_block_delta" => {
                let delta = data.get("delta");
                match delta.and_then(|d| d.get("type")).and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = delta.and_then(|d| d.get("text")).and_then(Value::as_str).unwrap_or("");
                        self.content_acc.push_str(text);
                        chunks.push(text_chunk(id, model, created, text, None));
                    }
                    Some("thinking_delta") => {
                        let text = delta.and_then(|d| d.get("thinking")).and_then(Value::as_str).unwrap_or("");
                        self.reasoning_acc.push_str(text);
                        chunks.push(text_chunk(id, model, created, "", Some(text)));
                    }
                    Some("input_json_delta") => {
                        let partial = delta.and_then(|d| d.get("partial_json")).and_then(Value::as_str).unwrap_or("");
                        if let Some(index) = self.current_index {
                            let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
                            chunk.choices.push(self.tools.delta(index, partial));
                            chunks.push(chunk);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                self.current_block_type = None;
                self.current_index = None;
            }
            "message_delta" => {
                if let Some(usage) = data.get("usage") {
                    self.output_tokens = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(self.output_tokens);
                }
                if let Some(reason) = data.get("delta").and_then(|d| d.get("stop_reason")).and_then(Value::as_str) {
                    let finish = map_stop_reason(reason);
                    let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
                    chunk.choices.push(gateway_core::ChunkChoice {
                        index: 0,
                        delta: gateway_core::Delta::default(),
                        finish_reason: Some(finish),
                    });
                    chunks.push(chunk);
                }
            }
            "message_stop" => {
                terminal = true;
            }
            _ => {}
        }

        (chunks, terminal)
    }

    /// Emit the synthetic final-usage chunk if Anthropic never reported
    /// a complete usage figure itself.
    pub fn finish(&mut self, id: &str, model: &str, created: i64) -> Option<ChatCompletionChunk> {
        if self.usage_emitted {
            return None;
        }
        self.usage_emitted = true;
        let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
        chunk.choices.push(gateway_core::ChunkChoice {
            index: 0,
            delta: gateway_core::Delta::default(),
            finish_reason: None,
        });
        let mut usage = gateway_core::Usage {
            prompt_tokens: self.input_tokens.max(1),
            completion_tokens: self.output_tokens,
            total_tokens: 0,
            reasoning_tokens: None,
            prompt_tokens_details: self.cache_read_tokens.map(|c| gateway_core::wire::PromptTokensDetails { cached_tokens: Some(c) }),
        };
        usage.recompute_total();
        chunk.usage = Some(usage);
        Some(chunk)
    }
}

fn text_chunk(id: &str, model: &str, created: i64, content: &str, reasoning: Option<&str>) -> ChatCompletionChunk {
    let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
    let delta = gateway_core::Delta {
        role: Some(Role::Assistant),
        content: (!content.is_empty()).then(|| content.to_string()),
        reasoning_content: reasoning.filter(|r| !r.is_empty()).map(str::to_string),
        tool_calls: None,
        images: None,
    };
    chunk.choices.push(gateway_core::ChunkChoice {
        index: 0,
        delta,
        finish_reason: None,
    });
    chunk
}
