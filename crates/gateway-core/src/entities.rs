//! Reference/config entities of §3 that are not append-only logs:
//! `Organization`, `Project`, `ApiKey`, `ProviderKey`, `CustomProvider`.
//!
//! These are plain CRUD rows owned by [`gateway-config`]'s store; the
//! domain shapes live here so every crate that needs to reason about them
//! (router, admission, usage) can depend on `gateway-core` alone.

use serde::{Deserialize, Serialize};

use crate::log::{Plan, ProjectMode, RetentionLevel};

/// An organization: the billing/plan boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub plan: Plan,
    pub credits: f64,
    pub auto_top_up_enabled: bool,
    pub auto_top_up_threshold: f64,
    pub auto_top_up_amount: f64,
    pub stripe_customer_id: Option<String>,
    pub retention_level: RetentionLevel,
}

impl Organization {
    /// True once credits have been exhausted for non-free models.
    #[must_use]
    pub fn out_of_credits(&self) -> bool {
        self.credits <= 0.0
    }
}

/// A project: the API surface an `ApiKey` is scoped to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub organization_id: String,
    pub mode: ProjectMode,
    pub caching_enabled: bool,
    pub cache_duration_seconds: i64,
}

impl Project {
    pub const MIN_CACHE_DURATION_SECS: i64 = 10;
    pub const MAX_CACHE_DURATION_SECS: i64 = 31_536_000;

    /// Clamp `cache_duration_seconds` into the allowed range.
    #[must_use]
    pub fn clamped_cache_duration(&self) -> i64 {
        self.cache_duration_seconds
            .clamp(Self::MIN_CACHE_DURATION_SECS, Self::MAX_CACHE_DURATION_SECS)
    }
}

/// A caller-facing credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub token: String,
    pub project_id: String,
    pub status: crate::log::KeyStatus,
    pub usage: f64,
    pub usage_limit: Option<f64>,
}

impl ApiKey {
    /// True when this key is active and has not exhausted its lifetime cap.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status == crate::log::KeyStatus::Active
            && self.usage_limit.is_none_or(|limit| self.usage < limit)
    }
}

/// An organization-owned upstream credential for one provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderKey {
    pub id: String,
    pub organization_id: String,
    pub provider: String,
    pub token: String,
    pub base_url: Option<String>,
    pub status: crate::log::KeyStatus,
}

/// A named user-registered OpenAI-compatible endpoint, addressed as
/// `<name>/<model>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomProvider {
    pub organization_id: String,
    pub name: String,
    pub base_url: String,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_without_limit_is_always_usable() {
        let key = ApiKey {
            id: "key_1".into(),
            token: "tok".into(),
            project_id: "proj_1".into(),
            status: crate::log::KeyStatus::Active,
            usage: 1_000_000.0,
            usage_limit: None,
        };
        assert!(key.is_usable());
    }

    #[test]
    fn api_key_over_limit_is_unusable() {
        let key = ApiKey {
            id: "key_1".into(),
            token: "tok".into(),
            project_id: "proj_1".into(),
            status: crate::log::KeyStatus::Active,
            usage: 10.0,
            usage_limit: Some(10.0),
        };
        assert!(!key.is_usable());
    }

    #[test]
    fn disabled_api_key_is_unusable() {
        let key = ApiKey {
            id: "key_1".into(),
            token: "tok".into(),
            project_id: "proj_1".into(),
            status: crate::log::KeyStatus::Disabled,
            usage: 0.0,
            usage_limit: None,
        };
        assert!(!key.is_usable());
    }

    #[test]
    fn cache_duration_clamped_to_floor() {
        let project = Project {
            id: "p".into(),
            organization_id: "o".into(),
            mode: ProjectMode::Credits,
            caching_enabled: true,
            cache_duration_seconds: 1,
        };
        assert_eq!(project.clamped_cache_duration(), 10);
    }

    #[test]
    fn cache_duration_clamped_to_ceiling() {
        let project = Project {
            id: "p".into(),
            organization_id: "o".into(),
            mode: ProjectMode::Credits,
            caching_enabled: true,
            cache_duration_seconds: 999_999_999,
        };
        assert_eq!(project.clamped_cache_duration(), 31_536_000);
    }
}
