//! Google (AI Studio / Vertex) dialect: `contents`/`parts` request
//! reshaping, non-streaming response parsing, and the streaming
//! `candidates[].content.parts` transformer (§4.3).

use base64::Engine as _;
use serde_json::{json, Value};

use gateway_core::{ChatCompletionChunk, ChatCompletionRequest, Content, ContentPart, FinishReason, Role, ToolCall, ToolCallFunction};
use gateway_tokenizer::Tokenizer;

use crate::response::{ParsedMessage, ParsedUsage};
use crate::sse::Frame;

/// Build a Google `generateContent`/`streamGenerateContent` request body:
/// `messages` reshaped into `contents`/`parts`, `tools` mapped into
/// `functionDeclarations`.
#[must_use]
pub fn build_request(req: &ChatCompletionRequest) -> Value {
    let mut contents = Vec::new();
    let mut system_instruction: Option<Value> = None;

    for message in &req.messages {
        match message.role {
            Role::System => {
                let text = message.content.as_ref().map(Content::as_text).unwrap_or_default();
                system_instruction = Some(json!({ "parts": [{ "text": text }] }));
            }
            Role::Tool => {
                let name = message.name.clone().unwrap_or_default();
                let text = message.content.as_ref().map(Content::as_text).unwrap_or_default();
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "response": { "content": text },
                        }
                    }]
                }));
            }
            Role::User => {
                contents.push(json!({ "role": "user", "parts": parts(message.content.as_ref()) }));
            }
            Role::Assistant => {
                let mut parts_arr = parts(message.content.as_ref());
                if let Some(tool_calls) = &message.tool_calls {
                    for call in tool_calls {
                        let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Object(serde_json::Map::new()));
                        parts_arr.push(json!({
                            "functionCall": { "name": call.function.name, "args": args }
                        }));
                    }
                }
                contents.push(json!({ "role": "model", "parts": parts_arr }));
            }
        }
    }

    let mut body = json!({ "contents": contents });
    let obj = body.as_object_mut().expect("object literal");

    let mut generation_config = serde_json::Map::new();
    if let Some(temperature) = req.temperature {
        let _ = generation_config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = req.top_p {
        let _ = generation_config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = req.max_tokens {
        let _ = generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if !generation_config.is_empty() {
        let _ = obj.insert("generationConfig".to_string(), Value::Object(generation_config));
    }
    if let Some(system) = system_instruction {
        let _ = obj.insert("systemInstruction".to_string(), system);
    }
    if let Some(tools) = &req.tools {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "parameters": t.function.parameters.clone().unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                })
            })
            .collect();
        let _ = obj.insert("tools".to_string(), json!([{ "functionDeclarations": declarations }]));
    }

    body
}

fn parts(content: Option<&Content>) -> Vec<Value> {
    match content {
        None => Vec::new(),
        Some(Content::Text(text)) => vec![json!({ "text": text })],
        Some(Content::Parts(parts)) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "text": text }),
                ContentPart::ImageUrl { image_url } => {
                    if let Some((mime, data)) = split_data_uri(&image_url.url) {
                        json!({ "inlineData": { "mimeType": mime, "data": data } })
                    } else {
                        json!({ "fileData": { "fileUri": image_url.url } })
                    }
                }
            })
            .collect(),
    }
}

/// Split a `data:{mime};base64,{data}` URI into its parts.
fn split_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime_and_marker, data) = rest.split_once(',')?;
    let mime = mime_and_marker.strip_suffix(";base64")?;
    Some((mime, data))
}

/// Parse a non-streaming `generateContent` response. Google's
/// `totalTokenCount` is intentionally ignored in favor of the canonical
/// recomputation (spec.md §9 Open Question); when `candidatesTokenCount`
/// is absent, the completion count is estimated locally from produced
/// content (or 0 when there is none — e.g. `MAX_TOKENS` with only
/// reasoning emitted).
#[must_use]
pub fn parse_response(body: &Value, tokenizer: &dyn Tokenizer) -> (ParsedMessage, ParsedUsage) {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut images = Vec::new();

    let candidate = body.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
    let finish_reason = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        .map(map_finish_reason);

    if let Some(parts) = candidate.and_then(|c| c.get("content")).and_then(|c| c.get("parts")).and_then(Value::as_array) {
        for part in parts {
            let is_thought = part.get("thought").and_then(Value::as_bool).unwrap_or(false);
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if is_thought {
                    reasoning.push_str(text);
                } else {
                    content.push_str(text);
                }
                continue;
            }
            if let Some(inline) = part.get("inlineData") {
                let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or("image/png");
                let data = inline.get("data").and_then(Value::as_str).unwrap_or("");
                images.push(format!("data:{mime};base64,{data}"));
                continue;
            }
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let args = call.get("args").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
                tool_calls.push(ToolCall {
                    id: format!("call_{}", uuid::Uuid::now_v7().simple()),
                    kind: "function".to_string(),
                    function: ToolCallFunction { name, arguments: args.to_string() },
                });
            }
        }
    }

    let usage_meta = body.get("usageMetadata");
    let prompt_tokens = usage_meta.and_then(|u| u.get("promptTokenCount")).and_then(Value::as_u64);
    let reported_completion = usage_meta.and_then(|u| u.get("candidatesTokenCount")).and_then(Value::as_u64);
    let reasoning_tokens = usage_meta.and_then(|u| u.get("thoughtsTokenCount")).and_then(Value::as_u64);
    let cached_tokens = usage_meta.and_then(|u| u.get("cachedContentTokenCount")).and_then(Value::as_u64);

    let completion_tokens = reported_completion.unwrap_or_else(|| {
        if content.is_empty() {
            0
        } else {
            tokenizer.count_text(&content)
        }
    });

    (
        ParsedMessage {
            content: (!content.is_empty()).then_some(content),
            reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            images: (!images.is_empty()).then_some(images),
            finish_reason,
        },
        ParsedUsage {
            prompt_tokens,
            completion_tokens: Some(completion_tokens),
            reasoning_tokens,
            cached_tokens,
        },
    )
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Streaming state for Google's `streamGenerateContent` SSE frames. Each
/// frame is itself a complete `GenerateContentResponse`, so no
/// cross-frame block-index bookkeeping is needed (unlike Anthropic).
#[derive(Default)]
pub struct StreamState {
    content_acc: String,
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

    /// Process one frame, returning canonical chunks plus whether the
    /// stream has reached its terminal event. Google never sends a
    /// `[DONE]` sentinel — a `finishReason` on the candidate is the only
    /// signal that the stream is over, so the caller must treat it as
    /// terminal itself rather than waiting for one.
    pub fn feed(&mut self, frame: &Frame, id: &str, model: &str, created: i64, tokenizer: &dyn Tokenizer) -> (Vec<ChatCompletionChunk>, bool) {
        let Ok(data): Result<Value, _> = serde_json::from_str(&frame.data) else {
            return (Vec::new(), false);
        };

        let mut chunks = Vec::new();
        let mut terminal = false;
        let candidate = data.get("candidates").and_then(Value::as_array).and_then(|c| c.first());

        if let Some(parts) = candidate.and_then(|c| c.get("content")).and_then(|c| c.get("parts")).and_then(Value::as_array) {
            let mut content_delta = String::new();
            let mut reasoning_delta = String::new();
            let mut image_deltas = Vec::new();
            let mut tool_calls = Vec::new();

            for part in parts {
                let is_thought = part.get("thought").and_then(Value::as_bool).unwrap_or(false);
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if is_thought {
                        reasoning_delta.push_str(text);
                    } else {
                        content_delta.push_str(text);
                        self.content_acc.push_str(text);
                    }
                } else if let Some(inline) = part.get("inlineData") {
                    let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or("image/png");
                    let img_data = inline.get("data").and_then(Value::as_str).unwrap_or("");
                    image_deltas.push(format!("data:{mime};base64,{img_data}"));
                } else if let Some(call) = part.get("functionCall") {
                    let name = call.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                    let args = call.get("args").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
                    tool_calls.push(gateway_core::ToolCallDelta {
                        index: 0,
                        id: Some(format!("call_{}", uuid::Uuid::now_v7().simple())),
                        kind: Some("function".to_string()),
                        function: Some(gateway_core::ToolCallFunctionDelta {
                            name: Some(name),
                            arguments: Some(args.to_string()),
                        }),
                    });
                }
            }

            if !content_delta.is_empty() || !reasoning_delta.is_empty() || !image_deltas.is_empty() || !tool_calls.is_empty() {
                let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
                chunk.choices.push(gateway_core::ChunkChoice {
                    index: 0,
                    delta: gateway_core::Delta {
                        role: Some(Role::Assistant),
                        content: (!content_delta.is_empty()).then_some(content_delta),
                        reasoning_content: (!reasoning_delta.is_empty()).then_some(reasoning_delta),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        images: (!image_deltas.is_empty()).then_some(image_deltas),
                    },
                    finish_reason: None,
                });
                chunks.push(chunk);
            }
        }

        if let Some(reason) = candidate.and_then(|c| c.get("finishReason")).and_then(Value::as_str) {
            terminal = true;
            let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), created);
            chunk.choices.push(gateway_core::ChunkChoice {
                index: 0,
                delta: gateway_core::Delta::default(),
                finish_reason: Some(map_finish_reason(reason)),
            });
            if let Some(usage_meta) = data.get("usageMetadata") {
                let prompt = usage_meta.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0);
                let completion = usage_meta.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0);
                let reasoning_tokens = usage_meta.get("thoughtsTokenCount").and_then(Value::as_u64);
                let prompt_tokens = if prompt == 0 {
                    tokenizer.count_text(&self.content_acc).max(1)
                } else {
                    prompt
                };
                let mut usage = gateway_core::Usage {
                    prompt_tokens,
                    completion_tokens: completion,
                    total_tokens: 0,
                    reasoning_tokens,
                    prompt_tokens_details: None,
                };
                usage.recompute_total();
                chunk.usage = Some(usage);
                self.usage_emitted = true;
            }
            chunks.push(chunk);
        }

        (chunks, terminal)
    }

    /// Emit the synthetic final-usage chunk when Google never reported
    /// `usageMetadata` alongside a `finishReason`.
    pub fn finish(&mut self, id: &str, model: &str, created: i64, tokenizer: &dyn Tokenizer, input_messages: &[gateway_core::ChatMessage]) -> Option<ChatCompletionChunk> {
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
            prompt_tokens: tokenizer.count_messages(input_messages, None).max(1),
            completion_tokens: tokenizer.count_text(&self.content_acc),
            total_tokens: 0,
            reasoning_tokens: None,
            prompt_tokens_details: None,
        };
        usage.recompute_total();
        chunk.usage = Some(usage);
        Some(chunk)
    }
}

/// Encode raw image bytes as a `data:` URI (used by tests and by callers
/// assembling synthetic inline-data parts).
#[must_use]
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}
