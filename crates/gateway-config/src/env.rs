//! Process-wide configuration read once from the environment (§5's
//! shared-resource policy: env vars are read-only after process start).

/// Gateway-wide deployment flags and billing-worker tunables.
#[derive(Clone, Debug)]
pub struct GatewayEnv {
    /// Multi-tenant hosted mode (projects/orgs/credits) vs. a single
    /// self-hosted deployment reading provider keys straight from env.
    pub hosted: bool,
    /// Whether credits-mode billing is active at all.
    pub paid_mode: bool,
    /// Prefer OpenAI's Responses API over chat completions where a model
    /// supports both.
    pub use_responses_api: bool,
    pub stripe_secret_key: Option<String>,
    pub credit_batch_size: u32,
    pub credit_batch_interval_ms: u64,
    pub is_production: bool,
}

impl GatewayEnv {
    /// Read configuration from the process environment, applying the
    /// same defaults the worker and router fall back to when a var is
    /// unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            hosted: read_bool("HOSTED", false),
            paid_mode: read_bool("PAID_MODE", false),
            use_responses_api: read_bool("USE_RESPONSES_API", false),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY").ok().filter(|v| !v.is_empty()),
            credit_batch_size: read_u32("CREDIT_BATCH_SIZE", 100),
            credit_batch_interval_ms: read_u64("CREDIT_BATCH_INTERVAL", 5_000),
            is_production: std::env::var("NODE_ENV").map(|v| v == "production").unwrap_or(false),
        }
    }
}

fn read_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

fn read_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn read_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
