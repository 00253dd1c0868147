//! The per-request context threaded through C1-C5 (spec.md §9 design
//! note: explicit request-context threading rather than ambient
//! thread-locals).

use gateway_core::ids::generate_request_id;

/// Everything downstream components need about the inbound request that
/// isn't part of the wire body itself.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub debug_mode: bool,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: Option<String>, debug_mode: bool) -> Self {
        Self {
            request_id: request_id.unwrap_or_else(generate_request_id),
            debug_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_supplied_request_id() {
        let ctx = RequestContext::new(Some("abc123".to_string()), false);
        assert_eq!(ctx.request_id, "abc123");
    }

    #[test]
    fn generates_id_when_absent() {
        let ctx = RequestContext::new(None, false);
        assert_eq!(ctx.request_id.len(), 40);
    }
}
