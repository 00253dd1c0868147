//! Mistral dialect: OpenAI-chat-completions-shaped wire format, plus one
//! quirk — content occasionally arrives wrapped in a ` ```json ... ``` `
//! fence, which is unwrapped and re-stringified as canonical JSON (§4.3).

use serde_json::Value;

use crate::openai::parse_chat_response;
use crate::response::{ParsedMessage, ParsedUsage};

/// Parse a Mistral chat-completions response, unwrapping a `json` code
/// fence around the content if present.
#[must_use]
pub fn parse_response(body: &Value) -> (ParsedMessage, ParsedUsage) {
    let (mut message, usage) = parse_chat_response(body, false, false);
    if let Some(content) = &message.content {
        if let Some(unwrapped) = unwrap_json_fence(content) {
            message.content = Some(unwrapped);
        }
    }
    (message, usage)
}

/// If `content` is entirely a ` ```json ... ``` ` (or bare ` ``` `) fence,
/// extract the inner text, parse it as JSON, and re-stringify it
/// canonically. Returns `None` when `content` isn't fenced JSON at all
/// (the original string should be kept as-is).
#[must_use]
pub fn unwrap_json_fence(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))?
        .strip_suffix("```")?
        .trim();
    let value: Value = serde_json::from_str(inner).ok()?;
    Some(value.to_string())
}
