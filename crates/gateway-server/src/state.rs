//! Shared application state: the one struct every handler reaches into,
//! built once at startup and cloned cheaply (every field is an `Arc` or
//! `Copy`).

use std::sync::Arc;
use std::time::Instant;

use gateway_cache::ResponseCache;
use gateway_config::{GatewayEnv, Store};
use gateway_router::registry::Registry;
use gateway_tokenizer::GptTokenizer;
use gateway_usage::LogQueue;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::ServerConfig;
use crate::shutdown::ShutdownCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cache: Arc<ResponseCache>,
    pub queue: Arc<LogQueue>,
    pub env: Arc<GatewayEnv>,
    pub http: reqwest::Client,
    pub tokenizer: Arc<GptTokenizer>,
    pub registry: &'static Registry,
    pub config: Arc<ServerConfig>,
    pub metrics_handle: Arc<PrometheusHandle>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        cache: Arc<ResponseCache>,
        queue: Arc<LogQueue>,
        env: GatewayEnv,
        http: reqwest::Client,
        config: ServerConfig,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            env: Arc::new(env),
            http,
            tokenizer: Arc::new(gateway_tokenizer::default_tokenizer()),
            registry: gateway_router::registry::global(),
            config: Arc::new(config),
            metrics_handle: Arc::new(metrics_handle),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }
}
