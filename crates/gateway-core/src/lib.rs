//! Shared wire schema, error taxonomy, and domain entities for the LLM
//! gateway workspace.
//!
//! This is the workspace's leaf crate: every other `gateway-*` crate
//! depends on it, and it depends on nothing in the workspace itself.

pub mod entities;
pub mod error;
pub mod ids;
pub mod log;
pub mod wire;

pub use entities::{ApiKey, CustomProvider, Organization, Project, ProviderKey};
pub use error::{classify_upstream_error, GatewayError, UpstreamErrorKind};
pub use ids::generate_request_id;
pub use log::{Lock, Log, Plan, ProjectMode, RetentionLevel, Transaction, UsedMode};
pub use wire::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, Content, ContentPart, Delta, FinishReason, ReasoningEffort, Role, Tool, ToolCall,
    ToolCallDelta, Usage,
};
