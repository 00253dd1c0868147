//! The gateway's error taxonomy.
//!
//! One variant per stable wire `type` string (spec taxonomy), each able to
//! render itself as the canonical `{error:{message,type,param,code}}`
//! envelope and report its own HTTP status.

use serde::Serialize;
use thiserror::Error;

/// All ways a request can fail to complete normally.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("payment required: {0}")]
    PaymentRequired(String),

    #[error("model deactivated: {0}")]
    Gone(String),

    /// The upstream provider rejected the request as invalid; its body is
    /// passed through to the caller verbatim with its original status.
    #[error("upstream client error (status {status})")]
    ClientError { status: u16, body: serde_json::Value },

    /// A 5xx (or otherwise server-side) failure from the upstream provider.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// Any other internal failure not attributable to the caller or the
    /// upstream provider's own validation.
    #[error("gateway error: {0}")]
    Internal(String),

    #[error("request canceled")]
    Canceled,

    #[error("streaming error: {0}")]
    StreamingError(String),

    #[error("could not parse upstream JSON: {0}")]
    JsonParseError(String),
}

impl GatewayError {
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: None,
        }
    }

    #[must_use]
    pub fn invalid_request_param(message: impl Into<String>, param: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: Some(param.into()),
        }
    }

    /// The stable wire `type` string for this error kind.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::PaymentRequired(_) => "payment_required",
            Self::Gone(_) => "gone",
            Self::ClientError { .. } => "client_error",
            Self::UpstreamError(_) => "upstream_error",
            Self::Internal(_) => "gateway_error",
            Self::Canceled => "canceled",
            Self::StreamingError(_) => "streaming_error",
            Self::JsonParseError(_) => "json_parse_error",
        }
    }

    /// The HTTP status this error maps onto. `ClientError` carries its own
    /// (upstream-original) status and is handled separately by the caller.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } | Self::Canceled => 400,
            Self::Unauthorized(_) => 401,
            Self::PaymentRequired(_) => 402,
            Self::Gone(_) => 410,
            Self::ClientError { status, .. } => *status,
            Self::UpstreamError(_) | Self::Internal(_) | Self::StreamingError(_) | Self::JsonParseError(_) => 500,
        }
    }

    /// Render the canonical error envelope body.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        if let Self::ClientError { body, .. } = self {
            if let Some(existing) = body.get("error") {
                return ErrorEnvelope {
                    error: existing.clone(),
                };
            }
            return ErrorEnvelope {
                error: serde_json::json!({
                    "message": self.to_string(),
                    "type": self.error_type(),
                }),
            };
        }
        let (message, param) = match self {
            Self::InvalidRequest { message, param } => (message.clone(), param.clone()),
            other => (other.to_string(), None),
        };
        ErrorEnvelope {
            error: serde_json::json!({
                "message": message,
                "type": self.error_type(),
                "param": param,
            }),
        }
    }
}

/// The canonical `{error: {...}}` JSON body returned to callers.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: serde_json::Value,
}

/// Classify an upstream HTTP failure into a finish-reason-style bucket,
/// mirroring `getFinishReasonForError(status, body)`.
#[must_use]
pub fn classify_upstream_error(status: u16, body: &str) -> UpstreamErrorKind {
    if status >= 500 {
        return UpstreamErrorKind::UpstreamError;
    }
    if status == 400
        && body.contains("'messages' must contain")
        && body.contains("the word 'json'")
    {
        return UpstreamErrorKind::ClientError;
    }
    UpstreamErrorKind::GatewayError
}

/// The bucket an upstream failure was classified into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    ClientError,
    UpstreamError,
    GatewayError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_400() {
        let err = GatewayError::invalid_request("bad body");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_type(), "invalid_request_error");
    }

    #[test]
    fn payment_required_maps_to_402() {
        let err = GatewayError::PaymentRequired("insufficient credits".into());
        assert_eq!(err.status_code(), 402);
        assert_eq!(err.error_type(), "payment_required");
    }

    #[test]
    fn gone_maps_to_410() {
        let err = GatewayError::Gone("model deactivated".into());
        assert_eq!(err.status_code(), 410);
    }

    #[test]
    fn client_error_preserves_original_status() {
        let err = GatewayError::ClientError {
            status: 400,
            body: serde_json::json!({"error": {"message": "bad"}}),
        };
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_type(), "client_error");
    }

    #[test]
    fn client_error_envelope_passes_through_original_body() {
        let err = GatewayError::ClientError {
            status: 400,
            body: serde_json::json!({"error": {"message": "'messages' must contain the word 'json'"}}),
        };
        let envelope = err.to_envelope();
        assert_eq!(
            envelope.error["message"],
            "'messages' must contain the word 'json'"
        );
    }

    #[test]
    fn classify_500_as_upstream_error() {
        assert_eq!(classify_upstream_error(503, ""), UpstreamErrorKind::UpstreamError);
    }

    #[test]
    fn classify_json_keyword_missing_as_client_error() {
        let body = "{\"error\": \"'messages' must contain the word 'json'\"}";
        assert_eq!(classify_upstream_error(400, body), UpstreamErrorKind::ClientError);
    }

    #[test]
    fn classify_other_400_as_gateway_error() {
        assert_eq!(classify_upstream_error(400, "some other error"), UpstreamErrorKind::GatewayError);
    }

    #[test]
    fn invalid_request_with_param() {
        let err = GatewayError::invalid_request_param("bad reasoning_effort", "reasoning_effort");
        let envelope = err.to_envelope();
        assert_eq!(envelope.error["param"], "reasoning_effort");
    }
}
