//! Upstream credential resolution (§4.2 "Key resolution").

/// A resolved upstream credential: either an organization's own
/// `ProviderKey` or the gateway's env-sourced credits-mode token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    pub token: String,
    pub base_url: Option<String>,
    /// True when this credential is the organization's own (billed via
    /// their upstream account, not the gateway's credits).
    pub is_provider_key: bool,
}

/// A minimal view of an organization's own upstream credential, supplied
/// by the caller (backed by `gateway-config`'s store in production).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderKeyRef {
    pub token: String,
    pub base_url: Option<String>,
}

/// A minimal view of a named custom provider, supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomProviderRef {
    pub token: String,
    pub base_url: String,
}

/// Lookups the router needs from the organization's stored credentials.
/// Kept as a trait so `gateway-router` never depends on `gateway-config`'s
/// concrete SQLite store — callers (admission/server) inject an
/// implementation backed by the real store.
pub trait KeySource {
    fn provider_key(&self, organization_id: &str, provider_id: &str) -> Option<ProviderKeyRef>;
    fn custom_provider(&self, organization_id: &str, name: &str) -> Option<CustomProviderRef>;
}

/// Read a provider's env-var-sourced token (credits-mode credential).
/// Read-only after process start, per spec.md §5's shared-resource policy.
#[must_use]
pub fn env_token(provider: &crate::registry::Provider) -> Option<String> {
    if provider.env_var.is_empty() {
        return None;
    }
    std::env::var(provider.env_var).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeKeySource;
    impl KeySource for FakeKeySource {
        fn provider_key(&self, _organization_id: &str, provider_id: &str) -> Option<ProviderKeyRef> {
            if provider_id == "openai" {
                Some(ProviderKeyRef {
                    token: "org-owned-token".into(),
                    base_url: None,
                })
            } else {
                None
            }
        }

        fn custom_provider(&self, _organization_id: &str, name: &str) -> Option<CustomProviderRef> {
            if name == "my-endpoint" {
                Some(CustomProviderRef {
                    token: "custom-token".into(),
                    base_url: "https://example.com".into(),
                })
            } else {
                None
            }
        }
    }

    #[test]
    fn finds_provider_key() {
        let source = FakeKeySource;
        let key = source.provider_key("org_1", "openai").unwrap();
        assert_eq!(key.token, "org-owned-token");
    }

    #[test]
    fn missing_provider_key_is_none() {
        let source = FakeKeySource;
        assert!(source.provider_key("org_1", "anthropic").is_none());
    }

    #[test]
    fn finds_custom_provider() {
        let source = FakeKeySource;
        let custom = source.custom_provider("org_1", "my-endpoint").unwrap();
        assert_eq!(custom.base_url, "https://example.com");
    }
}
