//! Shared streaming-state helpers used by more than one provider's state
//! machine: tool-call fragment accumulation keyed by content-block /
//! choice index (§4.3 "Tool-call accumulation matches by content-block
//! index for deltas and by `id` for starts").

use std::collections::BTreeMap;

use gateway_core::{ChunkChoice, Delta, ToolCallDelta, ToolCallFunctionDelta};

/// Accumulates per-index tool-call fragments across a stream so that a
/// `start` (carrying `id`/`name`) and any number of subsequent `delta`s
/// (carrying `arguments` fragments) can each be turned into one canonical
/// [`ChunkChoice`] without the caller tracking index bookkeeping itself.
#[derive(Default)]
pub struct ToolCallAccumulator {
    /// Tracks which indices have already emitted a `start`, so a delta
    /// arriving before its start (shouldn't happen, but dialects are not
    /// always well-behaved) still produces a sensible fragment.
    seen: BTreeMap<u32, ()>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new tool-call entry at `index` with its `id`/`name`.
    pub fn start(&mut self, index: u32, id: &str, name: &str) -> ChunkChoice {
        let _ = self.seen.insert(index, ());
        ChunkChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: None,
                reasoning_content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: Some(id.to_string()),
                    kind: Some("function".to_string()),
                    function: Some(ToolCallFunctionDelta {
                        name: Some(name.to_string()),
                        arguments: None,
                    }),
                }]),
                images: None,
            },
            finish_reason: None,
        }
    }

    /// Append an `arguments` fragment to the tool call at `index`.
    pub fn delta(&mut self, index: u32, arguments_fragment: &str) -> ChunkChoice {
        ChunkChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: None,
                reasoning_content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: None,
                    kind: None,
                    function: Some(ToolCallFunctionDelta {
                        name: None,
                        arguments: Some(arguments_fragment.to_string()),
                    }),
                }]),
                images: None,
            },
            finish_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_emits_id_and_name() {
        let mut acc = ToolCallAccumulator::new();
        let choice = acc.start(0, "call_1", "get_weather");
        let calls = choice.delta.tool_calls.unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].function.as_ref().unwrap().name.as_deref(), Some("get_weather"));
    }

    #[test]
    fn delta_carries_only_arguments_fragment() {
        let mut acc = ToolCallAccumulator::new();
        let choice = acc.delta(2, "{\"city\":");
        let calls = choice.delta.tool_calls.unwrap();
        assert_eq!(calls[0].index, 2);
        assert!(calls[0].id.is_none());
        assert_eq!(calls[0].function.as_ref().unwrap().arguments.as_deref(), Some("{\"city\":"));
    }
}
