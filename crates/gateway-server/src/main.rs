//! Gateway process entrypoint: opens the store, installs the metrics
//! recorder, spawns the usage worker, and serves the router with
//! graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use gateway_config::{new_file, new_in_memory, GatewayEnv, PoolConfig, Store};
use gateway_server::config::ServerConfig;
use gateway_server::AppState;
use gateway_usage::{HttpStripeClient, LogQueue, Worker, WorkerConfig};

fn db_path() -> Option<String> {
    std::env::var("DATABASE_PATH").ok().filter(|v| !v.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let env = GatewayEnv::from_env();
    let config = ServerConfig::from_env();

    let pool = match db_path() {
        Some(path) => new_file(&path, &PoolConfig::default()).context("failed to open gateway database")?,
        None => {
            info!("DATABASE_PATH not set — using an in-memory database");
            new_in_memory(&PoolConfig::default()).context("failed to open in-memory gateway database")?
        }
    };
    let store = Arc::new(Store::new(pool));
    store.migrate().context("failed to run gateway migrations")?;

    let metrics_handle = gateway_server::metrics::install_recorder();
    let cache = Arc::new(gateway_cache::ResponseCache::new());
    let queue = Arc::new(LogQueue::new());
    let http = reqwest::Client::new();

    let state = AppState::new(store.clone(), cache, queue.clone(), env.clone(), http.clone(), config.clone(), metrics_handle);

    let stripe = HttpStripeClient::new(http, env.stripe_secret_key.clone().unwrap_or_default());
    let worker = Worker::new(store, queue, stripe, WorkerConfig::default());
    let worker_token = state.shutdown.token();
    let worker_handle = tokio::spawn(async move {
        worker.run(worker_token).await;
    });
    state.shutdown.register_task(worker_handle);

    let router = gateway_server::build_router(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.context("failed to bind listener")?;
    let bound_addr = listener.local_addr().context("failed to read bound address")?;
    info!(addr = %bound_addr, "gateway listening");

    let shutdown_token = state.shutdown.token();
    let server_handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
                info!("http server shutdown initiated");
            })
            .await;
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("ctrl-c received, shutting down");

    let timeout = std::time::Duration::from_secs(state.config.worker_shutdown_secs);
    state.shutdown.graceful_shutdown(vec![server_handle], Some(timeout)).await;

    info!("gateway shutdown complete");
    Ok(())
}
