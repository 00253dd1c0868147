//! Ties the SSE [`Framer`](crate::sse::Framer) to a dialect-specific
//! stream state machine and applies the end-of-stream usage synthesis
//! rule uniformly (§4.3 "End-of-stream usage synthesis").
//!
//! This is the one place that knows how to turn a raw upstream byte
//! stream into the canonical sequence of `data:` lines the client
//! receives, regardless of which of the four streaming grammars produced
//! it.

use gateway_core::{ChatCompletionChunk, ChatMessage, Tool};
use gateway_tokenizer::Tokenizer;

use crate::sse::{Emitter, Frame, Framer};
use crate::{anthropic, google, openai, responses_stream};
use crate::{Dialect, DialectMapping};

/// Per-dialect streaming state, boxed behind one enum so the server
/// doesn't need to know which grammar it's driving.
enum DialectState {
    OpenAiChat(openai::ChatStreamState),
    Anthropic(anthropic::StreamState),
    Google(google::StreamState),
    Responses(responses_stream::StreamState),
}

/// Drives one streaming request end to end: reassembles SSE frames from
/// raw bytes, feeds them to the right dialect transformer, and emits
/// canonical `chat.completion.chunk` frames — including the synthesized
/// final-usage chunk and the terminal `[DONE]` sentinel.
pub struct StreamPipeline {
    framer: Framer,
    state: DialectState,
    dialect: DialectMapping,
    input_messages: Vec<ChatMessage>,
    input_tools: Option<Vec<Tool>>,
    terminal: bool,
    estimated: bool,
}

impl StreamPipeline {
    #[must_use]
    pub fn new(dialect: DialectMapping, input_messages: Vec<ChatMessage>, input_tools: Option<Vec<Tool>>) -> Self {
        let state = match dialect.dialect {
            Dialect::Anthropic => DialectState::Anthropic(anthropic::StreamState::new()),
            Dialect::Google => DialectState::Google(google::StreamState::new()),
            Dialect::OpenAiResponses => DialectState::Responses(responses_stream::StreamState::new()),
            Dialect::OpenAiChat | Dialect::Mistral => DialectState::OpenAiChat(openai::ChatStreamState::new()),
        };
        Self {
            framer: Framer::new(),
            state,
            dialect,
            input_messages,
            input_tools,
            terminal: false,
            estimated: false,
        }
    }

    /// Append raw upstream bytes and drain every complete event into
    /// canonical SSE output lines, ready to forward to the client
    /// verbatim.
    pub fn push(&mut self, bytes: &[u8], tokenizer: &dyn Tokenizer, emitter: &mut dyn Emitter) {
        self.framer.push(bytes);
        for frame in self.framer.drain_frames() {
            self.handle_frame(&frame, tokenizer, emitter);
        }
    }

    fn handle_frame(&mut self, frame: &Frame, tokenizer: &dyn Tokenizer, emitter: &mut dyn Emitter) {
        if frame.data == "[DONE]" {
            self.finish(tokenizer, emitter);
            emitter.emit_done();
            self.terminal = true;
            return;
        }

        match &mut self.state {
            DialectState::OpenAiChat(state) => {
                if let Some(chunk) = state.feed(frame, self.dialect.zai_finish_reason_fixup, self.last_input_was_tool_result()) {
                    emitter.emit_chunk(&chunk);
                }
            }
            DialectState::Anthropic(state) => {
                let (chunks, done) = state.feed(frame, "stream", "model", 0);
                for chunk in chunks {
                    emitter.emit_chunk(&chunk);
                }
                if done {
                    self.finish(tokenizer, emitter);
                    emitter.emit_done();
                    self.terminal = true;
                }
            }
            DialectState::Google(state) => {
                let (chunks, done) = state.feed(frame, "stream", "model", 0, tokenizer);
                for chunk in chunks {
                    emitter.emit_chunk(&chunk);
                }
                if done {
                    self.finish(tokenizer, emitter);
                    emitter.emit_done();
                    self.terminal = true;
                }
            }
            DialectState::Responses(state) => {
                let (chunk, done) = state.feed(frame);
                if let Some(chunk) = chunk {
                    emitter.emit_chunk(&chunk);
                }
                if done {
                    self.finish(tokenizer, emitter);
                    emitter.emit_done();
                    self.terminal = true;
                }
            }
        }
    }

    /// Force the end-of-stream synthesis and terminal `[DONE]` when the
    /// upstream byte stream closes without an explicit terminator: no
    /// `[DONE]`/`message_stop`/`finishReason`/`response.completed` ever
    /// arrived. Every dialect is expected to reach [`Self::terminal`] on
    /// its own; this is the fallback for an upstream that doesn't.
    pub fn finish_stream(&mut self, tokenizer: &dyn Tokenizer, emitter: &mut dyn Emitter) {
        if self.terminal {
            return;
        }
        self.finish(tokenizer, emitter);
        emitter.emit_done();
        self.terminal = true;
    }

    /// Emit the synthetic final-usage chunk if the dialect never reported
    /// one, per §4.3's end-of-stream synthesis rule. Anthropic's `finish`
    /// only repackages counts its own events already reported, so it
    /// never marks the request as cost-estimated; the other three
    /// dialects fall back to the local tokenizer when they synthesize,
    /// which does.
    fn finish(&mut self, tokenizer: &dyn Tokenizer, emitter: &mut dyn Emitter) {
        let chunk = match &mut self.state {
            DialectState::OpenAiChat(state) => {
                if state.usage_emitted() {
                    None
                } else {
                    self.estimated = true;
                    Some(synthesize_usage(tokenizer, &self.input_messages, self.input_tools.as_deref(), state.accumulated_content(), "stream", "model"))
                }
            }
            DialectState::Anthropic(state) => state.finish("stream", "model", 0),
            DialectState::Google(state) => {
                let chunk = state.finish("stream", "model", 0, tokenizer, &self.input_messages);
                self.estimated |= chunk.is_some();
                chunk
            }
            DialectState::Responses(state) => {
                let chunk = state.finish(tokenizer, &self.input_messages);
                self.estimated |= chunk.is_some();
                chunk
            }
        };
        if let Some(chunk) = chunk {
            emitter.emit_chunk(&chunk);
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether the final usage figures came from the local tokenizer
    /// fallback rather than being reported by the upstream, for §3's
    /// `Log.estimatedCost`.
    #[must_use]
    pub fn usage_estimated(&self) -> bool {
        self.estimated
    }

    fn last_input_was_tool_result(&self) -> bool {
        openai::last_message_was_tool_result(&self.input_messages)
    }
}

fn synthesize_usage(
    tokenizer: &dyn Tokenizer,
    input_messages: &[ChatMessage],
    input_tools: Option<&[Tool]>,
    accumulated_content: &str,
    id: &str,
    model: &str,
) -> ChatCompletionChunk {
    let mut chunk = ChatCompletionChunk::new(id.to_string(), model.to_string(), 0);
    chunk.choices.push(gateway_core::ChunkChoice {
        index: 0,
        delta: gateway_core::Delta::default(),
        finish_reason: None,
    });
    let mut usage = gateway_core::Usage {
        prompt_tokens: tokenizer.count_messages(input_messages, input_tools).max(1),
        completion_tokens: tokenizer.count_text(accumulated_content),
        total_tokens: 0,
        reasoning_tokens: None,
        prompt_tokens_details: None,
    };
    usage.recompute_total();
    chunk.usage = Some(usage);
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DialectMapping;
    use gateway_core::{Content, Role};
    use gateway_tokenizer::default_tokenizer;

    struct CollectEmitter {
        chunks: Vec<ChatCompletionChunk>,
        done: bool,
    }

    impl Emitter for CollectEmitter {
        fn emit_chunk(&mut self, chunk: &ChatCompletionChunk) {
            self.chunks.push(chunk.clone());
        }
        fn emit_done(&mut self) {
            self.done = true;
        }
    }

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
    fn openai_chat_pipeline_emits_synthetic_usage_before_done() {
        let mapping = DialectMapping {
            dialect: Dialect::OpenAiChat,
            zai_finish_reason_fixup: false,
        };
        let mut pipeline = StreamPipeline::new(mapping, vec![user_message()], None);
        let tokenizer = default_tokenizer();
        let mut emitter = CollectEmitter { chunks: Vec::new(), done: false };

        pipeline.push(
            b"data: {\"id\":\"1\",\"model\":\"m\",\"created\":0,\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            &tokenizer,
            &mut emitter,
        );
        pipeline.push(b"data: [DONE]\n\n", &tokenizer, &mut emitter);

        assert!(emitter.done);
        assert!(pipeline.is_terminal());
        assert!(pipeline.usage_estimated());
        let usage_chunks: Vec<_> = emitter.chunks.iter().filter(|c| c.usage.is_some()).collect();
        assert_eq!(usage_chunks.len(), 1);
    }

    #[test]
    fn anthropic_pipeline_runs_to_message_stop_and_synthesizes_usage() {
        let mapping = DialectMapping {
            dialect: Dialect::Anthropic,
            zai_finish_reason_fixup: false,
        };
        let mut pipeline = StreamPipeline::new(mapping, vec![user_message()], None);
        let tokenizer = default_tokenizer();
        let mut emitter = CollectEmitter { chunks: Vec::new(), done: false };

        pipeline.push(
            b"event: content_block_start\ndata: {\"index\":0,\"content_block\":{\"type\":\"text\"}}\n\n",
            &tokenizer,
            &mut emitter,
        );
        pipeline.push(
            b"event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            &tokenizer,
            &mut emitter,
        );
        pipeline.push(b"event: message_stop\ndata: {}\n\n", &tokenizer, &mut emitter);

        assert!(emitter.done);
        assert!(pipeline.is_terminal());
        assert!(!pipeline.usage_estimated());
        let usage_chunks: Vec<_> = emitter.chunks.iter().filter(|c| c.usage.is_some()).collect();
        assert_eq!(usage_chunks.len(), 1);
    }

    #[test]
    fn google_pipeline_terminates_on_finish_reason_without_done_sentinel() {
        let mapping = DialectMapping {
            dialect: Dialect::Google,
            zai_finish_reason_fixup: false,
        };
        let mut pipeline = StreamPipeline::new(mapping, vec![user_message()], None);
        let tokenizer = default_tokenizer();
        let mut emitter = CollectEmitter { chunks: Vec::new(), done: false };

        pipeline.push(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n", &tokenizer, &mut emitter);
        pipeline.push(
            b"data: {\"candidates\":[{\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":2}}\n\n",
            &tokenizer,
            &mut emitter,
        );

        assert!(emitter.done);
        assert!(pipeline.is_terminal());
        assert!(!pipeline.usage_estimated());
    }

    #[test]
    fn responses_pipeline_terminates_on_response_completed_without_done_sentinel() {
        let mapping = DialectMapping {
            dialect: Dialect::OpenAiResponses,
            zai_finish_reason_fixup: false,
        };
        let mut pipeline = StreamPipeline::new(mapping, vec![user_message()], None);
        let tokenizer = default_tokenizer();
        let mut emitter = CollectEmitter { chunks: Vec::new(), done: false };

        pipeline.push(b"event: response.output_text.delta\ndata: {\"delta\":\"Hi\"}\n\n", &tokenizer, &mut emitter);
        pipeline.push(
            b"event: response.completed\ndata: {\"response\":{\"usage\":{\"input_tokens\":10,\"output_tokens\":5}}}\n\n",
            &tokenizer,
            &mut emitter,
        );

        assert!(emitter.done);
        assert!(pipeline.is_terminal());
        assert!(!pipeline.usage_estimated());
    }

    #[test]
    fn finish_stream_synthesizes_usage_when_upstream_closes_without_a_terminator() {
        let mapping = DialectMapping {
            dialect: Dialect::Google,
            zai_finish_reason_fixup: false,
        };
        let mut pipeline = StreamPipeline::new(mapping, vec![user_message()], None);
        let tokenizer = default_tokenizer();
        let mut emitter = CollectEmitter { chunks: Vec::new(), done: false };

        pipeline.push(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n", &tokenizer, &mut emitter);
        assert!(!pipeline.is_terminal());

        pipeline.finish_stream(&tokenizer, &mut emitter);

        assert!(emitter.done);
        assert!(pipeline.is_terminal());
        assert!(pipeline.usage_estimated());
        let usage_chunks: Vec<_> = emitter.chunks.iter().filter(|c| c.usage.is_some()).collect();
        assert_eq!(usage_chunks.len(), 1);
    }
}
