//! Shared response-assembly: every provider's non-streaming parser reduces
//! to a `(ParsedMessage, ParsedUsage)` pair, finalized here into the
//! canonical [`ChatCompletionResponse`] with the token-floor and
//! reasoning-accounting rules applied uniformly (§4.3).

use gateway_core::{ChatCompletionResponse, ChatMessage, Choice, FinishReason, Role, ToolCall, Usage};
use gateway_tokenizer::Tokenizer;

/// The assistant message extracted from one provider's response, before
/// token accounting is finalized.
#[derive(Clone, Debug, Default)]
pub struct ParsedMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub images: Option<Vec<String>>,
    pub finish_reason: Option<FinishReason>,
}

/// Token usage as reported (or partially reported) by the upstream
/// provider; `None` fields are filled in by [`finalize`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ParsedUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
}

/// Assemble the canonical response, applying the accounting rules shared
/// by every dialect: `prompt_tokens = max(1, reported)`, missing counts
/// filled from the local tokenizer, `total` always recomputed as
/// `prompt + completion + reasoning`. The returned `bool` is whether
/// either count was filled locally rather than reported by upstream, for
/// §3's `Log.estimatedCost`.
#[must_use]
pub fn finalize(
    id: String,
    created: i64,
    model: String,
    message: ParsedMessage,
    usage: ParsedUsage,
    tokenizer: &dyn Tokenizer,
    input_messages: &[gateway_core::ChatMessage],
    input_tools: Option<&[gateway_core::Tool]>,
) -> (ChatCompletionResponse, bool) {
    let estimated = usage.prompt_tokens.is_none() || usage.completion_tokens.is_none();

    let prompt_tokens = usage
        .prompt_tokens
        .unwrap_or_else(|| tokenizer.count_messages(input_messages, input_tools))
        .max(1);

    let completion_tokens = usage.completion_tokens.unwrap_or_else(|| {
        message
            .content
            .as_deref()
            .map(|c| tokenizer.count_text(c))
            .unwrap_or(0)
    });

    let mut canonical_usage = Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: 0,
        reasoning_tokens: usage.reasoning_tokens,
        prompt_tokens_details: usage.cached_tokens.map(|cached_tokens| gateway_core::wire::PromptTokensDetails {
            cached_tokens: Some(cached_tokens),
        }),
    };
    canonical_usage.recompute_total();

    let chat_message = ChatMessage {
        role: Role::Assistant,
        content: message.content.map(gateway_core::Content::Text),
        name: None,
        tool_call_id: None,
        tool_calls: message.tool_calls,
        reasoning_content: message.reasoning_content,
        images: message.images,
    };

    let response = ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model,
        choices: vec![Choice {
            index: 0,
            message: chat_message,
            finish_reason: message.finish_reason,
        }],
        usage: canonical_usage,
    };

    (response, estimated)
}
