//! HTTP surface: wires C1-C5 together behind `/v1/chat/completions` and
//! `/v1/messages`.

pub mod config;
pub mod error_response;
pub mod handlers;
pub mod health;
pub mod log_builder;
pub mod messages_ingress;
pub mod metrics;
pub mod routing;
pub mod shutdown;
pub mod state;
pub mod upstream;

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

pub use state::AppState;

use health::{health_check, HealthResponse};

/// Generates UUIDv7 request IDs for requests that didn't already carry an
/// `x-request-id` of their own.
#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = gateway_core::generate_request_id();
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Build the complete Axum router: the two ingress routes, the ambient
/// `/health`/`/metrics` endpoints, and the middleware stack (outermost
/// layer runs first on the request, last on the response).
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/messages", post(messages_ingress::messages))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(120)))
        .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
        .layer(PropagateRequestIdLayer::x_request_id())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(state.start_time))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
