//! Domain types for the persisted entities of §3: `Log`, `Transaction`,
//! `Lock`, and the small enums they reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Billing/provisioning mode a project operates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectMode {
    ApiKeys,
    Credits,
    Hybrid,
}

/// Which rail a completed request was actually billed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedMode {
    ApiKeys,
    Credits,
}

/// Organization subscription tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
}

/// Whether a project retains full request/response content in its logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionLevel {
    All,
    None,
}

/// API key / custom provider activation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Disabled,
}

/// Unified finish reason recorded on the log row (a superset of the wire
/// `FinishReason` that also covers gateway-internal outcomes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedFinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Canceled,
    ClientError,
    UpstreamError,
    GatewayError,
}

/// One completed-or-failed request, exactly one written per terminal
/// outcome (success, cache hit, error, or cancellation).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub request_id: String,
    pub organization_id: String,
    pub project_id: String,
    pub api_key_id: String,
    pub used_mode: Option<UsedMode>,
    pub used_model: Option<String>,
    pub used_provider: Option<String>,
    pub requested_model: String,
    pub requested_provider: Option<String>,
    pub duration_ms: i64,
    pub response_size: i64,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub finish_reason: Option<String>,
    pub unified_finish_reason: Option<UnifiedFinishReason>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub reasoning_tokens: i64,
    pub cached_tokens: i64,
    pub has_error: bool,
    pub streamed: bool,
    pub canceled: bool,
    pub error_details: Option<serde_json::Value>,
    pub cost: f64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub cached_input_cost: f64,
    pub request_cost: f64,
    pub estimated_cost: bool,
    pub cached: bool,
    pub tool_results: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Log {
    /// Strip message/content fields in place, per `retentionLevel = none`.
    /// The row itself is still written — only the content-bearing fields
    /// are dropped before it ever reaches storage.
    pub fn strip_for_retention(&mut self) {
        self.content = None;
        self.reasoning_content = None;
        self.tool_results = None;
    }
}

/// A pending-or-settled credit top-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub organization_id: String,
    pub kind: TransactionKind,
    pub credit_amount: f64,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    CreditTopup,
}

/// A process-wide mutex row. A row older than [`Lock::EXPIRY_SECS`] is
/// considered expired and may be reclaimed by a new acquirer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lock {
    pub key: String,
    pub updated_at: DateTime<Utc>,
}

impl Lock {
    /// A lock row older than this is considered abandoned (e.g. a worker
    /// crashed mid-sweep) and can be reclaimed.
    pub const EXPIRY_SECS: i64 = 300;

    /// The two well-known lock keys the worker coordinates on.
    pub const CREDIT_PROCESSING: &'static str = "credit_processing";
    pub const AUTO_TOPUP_CHECK: &'static str = "auto_topup_check";

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.updated_at).num_seconds() >= Self::EXPIRY_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn lock_not_expired_when_fresh() {
        let lock = Lock {
            key: Lock::CREDIT_PROCESSING.to_string(),
            updated_at: Utc::now(),
        };
        assert!(!lock.is_expired(Utc::now()));
    }

    #[test]
    fn lock_expired_after_five_minutes() {
        let lock = Lock {
            key: Lock::CREDIT_PROCESSING.to_string(),
            updated_at: Utc::now() - Duration::seconds(301),
        };
        assert!(lock.is_expired(Utc::now()));
    }

    #[test]
    fn strip_for_retention_clears_content_only() {
        let mut log = make_log();
        log.content = Some("hello".to_string());
        log.reasoning_content = Some("thinking".to_string());
        log.strip_for_retention();
        assert!(log.content.is_none());
        assert!(log.reasoning_content.is_none());
        // Non-content fields are untouched.
        assert_eq!(log.request_id, "req_1");
    }

    fn make_log() -> Log {
        Log {
            request_id: "req_1".to_string(),
            organization_id: "org_1".to_string(),
            project_id: "proj_1".to_string(),
            api_key_id: "key_1".to_string(),
            used_mode: Some(UsedMode::Credits),
            used_model: Some("openai/gpt-5-nano".to_string()),
            used_provider: Some("openai".to_string()),
            requested_model: "gpt-5-nano".to_string(),
            requested_provider: None,
            duration_ms: 100,
            response_size: 42,
            content: None,
            reasoning_content: None,
            finish_reason: Some("stop".to_string()),
            unified_finish_reason: Some(UnifiedFinishReason::Stop),
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            reasoning_tokens: 0,
            cached_tokens: 0,
            has_error: false,
            streamed: false,
            canceled: false,
            error_details: None,
            cost: 0.001,
            input_cost: 0.0005,
            output_cost: 0.0005,
            cached_input_cost: 0.0,
            request_cost: 0.0,
            estimated_cost: false,
            cached: false,
            tool_results: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}
