//! Server-level configuration: bind address and the ambient HTTP knobs
//! layered on top of [`gateway_config::GatewayEnv`].

/// Request body size cap for `/v1/chat/completions` and `/v1/messages`
/// (prompts can be large, so this is generous).
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// How long the worker's background task gets to drain on shutdown
/// before being aborted (spec.md §5 "Worker shutdown").
const DEFAULT_WORKER_SHUTDOWN_SECS: u64 = 15;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub worker_shutdown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            worker_shutdown_secs: DEFAULT_WORKER_SHUTDOWN_SECS,
        }
    }
}

impl ServerConfig {
    /// Overlay `HOST`/`PORT` from the environment onto the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_all_interfaces() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.worker_shutdown_secs, 15);
    }
}
