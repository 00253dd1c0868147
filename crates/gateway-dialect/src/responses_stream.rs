//! Streaming transformer for the OpenAI Responses API event stream
//! (`response.created`, `response.reasoning_summary_text.delta`,
//! `response.output_text.delta`, `response.completed`, ...) (§4.3).

use serde_json::Value;

use gateway_core::{ChatCompletionChunk, FinishReason, Role};

use crate::sse::Frame;

#[derive(Default)]
pub struct StreamState {
    id: String,
    model: String,
    created: i64,
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

    #[must_use]
    pub fn usage_emitted(&self) -> bool {
        self.usage_emitted
    }

    /// Process one reassembled event, returning zero or one canonical
    /// chunk (each Responses-API event maps to at most one delta) plus
    /// whether the stream has reached its terminal event. The Responses
    /// API ends with `response.completed`, not a `[DONE]` sentinel, so
    /// the caller must treat that event as terminal itself.
    pub fn feed(&mut self, frame: &Frame) -> (Option<ChatCompletionChunk>, bool) {
        let Ok(data): Result<Value, _> = serde_json::from_str(&frame.data) else {
            return (None, false);
        };
        let event_type = frame.event.as_deref().unwrap_or_else(|| data.get("type").and_then(Value::as_str).unwrap_or(""));

        match event_type {
            "response.created" | "response.in_progress" => {
                if let Some(response) = data.get("response") {
                    self.id = response.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                    self.model = response.get("model").and_then(Value::as_str).unwrap_or_default().to_string();
                    self.created = response.get("created_at").and_then(Value::as_i64).unwrap_or(0);
                }
                (None, false)
            }
            "response.output_text.delta" => {
                let text = data.get("delta").and_then(Value::as_str).unwrap_or("");
                self.content_acc.push_str(text);
                (Some(self.text_chunk(text, None)), false)
            }
            "response.reasoning_summary_text.delta" => {
                let text = data.get("delta").and_then(Value::as_str).unwrap_or("");
                (Some(self.text_chunk("", Some(text))), false)
            }
            "response.completed" => {
                let usage = data.get("response").and_then(|r| r.get("usage"));
                let mut chunk = ChatCompletionChunk::new(self.id.clone(), self.model.clone(), self.created);
                chunk.choices.push(gateway_core::ChunkChoice {
                    index: 0,
                    delta: gateway_core::Delta::default(),
                    finish_reason: Some(FinishReason::Stop),
                });
                if let Some(usage) = usage {
                    let prompt = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                    let completion = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
                    let reasoning = usage
                        .get("output_tokens_details")
                        .and_then(|d| d.get("reasoning_tokens"))
                        .and_then(Value::as_u64);
                    let mut canonical = gateway_core::Usage {
                        prompt_tokens: prompt.max(1),
                        completion_tokens: completion,
                        total_tokens: 0,
                        reasoning_tokens: reasoning,
                        prompt_tokens_details: None,
                    };
                    canonical.recompute_total();
                    chunk.usage = Some(canonical);
                    self.usage_emitted = true;
                }
                (Some(chunk), true)
            }
            _ => (None, false),
        }
    }

    fn text_chunk(&self, content: &str, reasoning: Option<&str>) -> ChatCompletionChunk {
        let mut chunk = ChatCompletionChunk::new(self.id.clone(), self.model.clone(), self.created);
        chunk.choices.push(gateway_core::ChunkChoice {
            index: 0,
            delta: gateway_core::Delta {
                role: Some(Role::Assistant),
                content: (!content.is_empty()).then(|| content.to_string()),
                reasoning_content: reasoning.filter(|r| !r.is_empty()).map(str::to_string),
                tool_calls: None,
                images: None,
            },
            finish_reason: None,
        });
        chunk
    }

    /// Emit the synthetic final-usage chunk if `response.completed`
    /// never carried usage (e.g. the stream was cut short).
    pub fn finish(&mut self, tokenizer: &dyn gateway_tokenizer::Tokenizer, input_messages: &[gateway_core::ChatMessage]) -> Option<ChatCompletionChunk> {
        if self.usage_emitted {
            return None;
        }
        self.usage_emitted = true;
        let mut chunk = ChatCompletionChunk::new(self.id.clone(), self.model.clone(), self.created);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_delta_forwards_content() {
        let mut state = StreamState::new();
        let (chunk, terminal) = state.feed(&Frame {
            event: Some("response.output_text.delta".to_string()),
            data: r#"{"delta":"Hi"}"#.into(),
        });
        let chunk = chunk.unwrap();
        assert!(!terminal);
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
        assert_eq!(state.accumulated_content(), "Hi");
    }

    #[test]
    fn reasoning_summary_delta_maps_to_reasoning_content() {
        let mut state = StreamState::new();
        let (chunk, _) = state.feed(&Frame {
            event: Some("response.reasoning_summary_text.delta".to_string()),
            data: r#"{"delta":"thinking"}"#.into(),
        });
        assert_eq!(chunk.unwrap().choices[0].delta.reasoning_content.as_deref(), Some("thinking"));
    }

    #[test]
    fn completed_event_carries_usage_and_is_terminal() {
        let mut state = StreamState::new();
        let (chunk, terminal) = state.feed(&Frame {
            event: Some("response.completed".to_string()),
            data: r#"{"response":{"usage":{"input_tokens":10,"output_tokens":5}}}"#.into(),
        });
        assert!(chunk.unwrap().usage.is_some());
        assert!(terminal);
        assert!(state.usage_emitted());
    }
}
