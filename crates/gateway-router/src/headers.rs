//! Upstream request headers (§4.2, implementation budget's "provider
//! endpoint/headers/request-body helpers"): a pure function of
//! `(provider, token)`, companion to [`crate::endpoint::build_endpoint`].
//!
//! Most of the registry speaks plain `Authorization: Bearer` like
//! OpenAI; Anthropic and Google are the two exceptions baked into every
//! gateway of this shape.

/// Build the upstream request headers for `provider_id`. Returned as
/// owned `(name, value)` pairs so this crate doesn't need to depend on
/// an HTTP header-map type; the caller (the server's upstream client)
/// inserts them into whatever request type it holds.
#[must_use]
pub fn build_headers(provider_id: &str, token: Option<&str>) -> Vec<(&'static str, String)> {
    match provider_id {
        "anthropic" => {
            let mut headers = vec![("anthropic-version", "2023-06-01".to_string())];
            if let Some(token) = token {
                headers.push(("x-api-key", token.to_string()));
            }
            headers
        }
        // Google's credential travels in the query string (see
        // `build_endpoint`); no auth header needed.
        "google-ai-studio" | "google-vertex" => Vec::new(),
        _ => token
            .map(|token| vec![("authorization", format!("Bearer {token}"))])
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_uses_x_api_key_and_version() {
        let headers = build_headers("anthropic", Some("sk-ant-1"));
        assert!(headers.contains(&("anthropic-version", "2023-06-01".to_string())));
        assert!(headers.contains(&("x-api-key", "sk-ant-1".to_string())));
        assert!(!headers.iter().any(|(name, _)| *name == "authorization"));
    }

    #[test]
    fn google_has_no_headers() {
        assert!(build_headers("google-ai-studio", Some("key")).is_empty());
    }

    #[test]
    fn openai_compatible_uses_bearer() {
        let headers = build_headers("openai", Some("sk-1"));
        assert_eq!(headers, vec![("authorization", "Bearer sk-1".to_string())]);
    }

    #[test]
    fn missing_token_yields_no_headers() {
        assert!(build_headers("openai", None).is_empty());
    }
}
