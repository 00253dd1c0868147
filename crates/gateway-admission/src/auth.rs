//! Bearer authentication and entity loading (spec.md §4.1 steps 3-5).
//!
//! Kept as a trait for the same reason `gateway-router::keys::KeySource`
//! is: admission sits below `gateway-config` in the dependency order
//! (§2), so it cannot depend on the concrete `SQLite` store. The server
//! wires a real implementation in at startup.

use gateway_core::entities::{ApiKey, Organization, Project};
use gateway_core::GatewayError;

/// Lookups admission needs from the organization's stored entities.
pub trait AdmissionStore {
    fn api_key_by_token(&self, token: &str) -> Option<ApiKey>;
    fn project(&self, id: &str) -> Option<Project>;
    fn organization(&self, id: &str) -> Option<Organization>;
    fn custom_provider_exists(&self, organization_id: &str, name: &str) -> bool;
}

/// The authenticated/loaded identity for one request.
#[derive(Clone)]
pub struct Identity {
    pub api_key: ApiKey,
    pub project: Project,
    pub organization: Organization,
}

/// Parse `Authorization: Bearer <token>`, then load the ApiKey/Project/
/// Organization chain, enforcing activation and usage-limit checks
/// (spec.md §4.1 steps 3-5).
pub fn authenticate(authorization_header: Option<&str>, store: &dyn AdmissionStore) -> Result<Identity, GatewayError> {
    let header = authorization_header.ok_or_else(|| GatewayError::Unauthorized("missing Authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| GatewayError::Unauthorized("Authorization header must be a Bearer token".into()))?
        .trim();
    if token.is_empty() {
        return Err(GatewayError::Unauthorized("empty bearer token".into()));
    }

    let api_key = store
        .api_key_by_token(token)
        .ok_or_else(|| GatewayError::Unauthorized("invalid API key".into()))?;

    if !api_key.is_usable() {
        return Err(GatewayError::Unauthorized("API key is disabled or over its usage limit".into()));
    }

    let project = store
        .project(&api_key.project_id)
        .ok_or_else(|| GatewayError::Internal("api key references a missing project".into()))?;

    let organization = store
        .organization(&project.organization_id)
        .ok_or_else(|| GatewayError::Internal("project references a missing organization".into()))?;

    Ok(Identity { api_key, project, organization })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::log::{KeyStatus, Plan, ProjectMode, RetentionLevel};

    struct FakeStore;

    impl AdmissionStore for FakeStore {
        fn api_key_by_token(&self, token: &str) -> Option<ApiKey> {
            if token == "sk-good" {
                Some(ApiKey {
                    id: "key_1".into(),
                    token: token.into(),
                    project_id: "proj_1".into(),
                    status: KeyStatus::Active,
                    usage: 0.0,
                    usage_limit: None,
                })
            } else if token == "sk-disabled" {
                Some(ApiKey {
                    id: "key_2".into(),
                    token: token.into(),
                    project_id: "proj_1".into(),
                    status: KeyStatus::Disabled,
                    usage: 0.0,
                    usage_limit: None,
                })
            } else {
                None
            }
        }

        fn project(&self, id: &str) -> Option<Project> {
            if id == "proj_1" {
                Some(Project {
                    id: "proj_1".into(),
                    organization_id: "org_1".into(),
                    mode: ProjectMode::Credits,
                    caching_enabled: false,
                    cache_duration_seconds: 300,
                })
            } else {
                None
            }
        }

        fn organization(&self, id: &str) -> Option<Organization> {
            if id == "org_1" {
                Some(Organization {
                    id: "org_1".into(),
                    plan: Plan::Free,
                    credits: 10.0,
                    auto_top_up_enabled: false,
                    auto_top_up_threshold: 0.0,
                    auto_top_up_amount: 0.0,
                    stripe_customer_id: None,
                    retention_level: RetentionLevel::All,
                })
            } else {
                None
            }
        }

        fn custom_provider_exists(&self, _organization_id: &str, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn rejects_missing_header() {
        let err = authenticate(None, &FakeStore).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn rejects_non_bearer_header() {
        let err = authenticate(Some("Basic abc"), &FakeStore).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn rejects_unknown_token() {
        let err = authenticate(Some("Bearer sk-nope"), &FakeStore).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn rejects_disabled_key() {
        let err = authenticate(Some("Bearer sk-disabled"), &FakeStore).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn accepts_valid_bearer_token() {
        let identity = authenticate(Some("Bearer sk-good"), &FakeStore).unwrap();
        assert_eq!(identity.organization.id, "org_1");
        assert_eq!(identity.project.id, "proj_1");
    }
}
