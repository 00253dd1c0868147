use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use gateway_core::{ChatMessage, Tool};

use crate::Tokenizer;

/// A `cl100k_base`-encoded tokenizer, matching the "gpt-4" tiktoken
/// encoding the source gateway used for every provider.
pub struct GptTokenizer {
    bpe: Arc<CoreBPE>,
}

impl GptTokenizer {
    #[must_use]
    pub fn new() -> Self {
        // cl100k_base is the gpt-4 / gpt-3.5-turbo encoding; infallible for
        // the bundled vocabulary.
        Self {
            bpe: Arc::new(tiktoken_rs::cl100k_base().expect("bundled cl100k_base vocabulary")),
        }
    }
}

impl Default for GptTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for GptTokenizer {
    fn count_messages(&self, messages: &[ChatMessage], tools: Option<&[Tool]>) -> u64 {
        let mut text = String::new();
        for message in messages {
            if let Some(content) = &message.content {
                text.push_str(&content.as_text());
                text.push('\n');
            }
            if let Some(name) = &message.name {
                text.push_str(name);
                text.push('\n');
            }
            if let Some(tool_calls) = &message.tool_calls {
                for call in tool_calls {
                    text.push_str(&call.function.name);
                    text.push_str(&call.function.arguments);
                }
            }
        }
        if let Some(tools) = tools {
            for tool in tools {
                text.push_str(&tool.function.name);
                if let Some(description) = &tool.function.description {
                    text.push_str(description);
                }
                if let Some(parameters) = &tool.function.parameters {
                    text.push_str(&parameters.to_string());
                }
            }
        }
        self.count_text(&text)
    }

    fn count_text(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len() as u64
    }
}
