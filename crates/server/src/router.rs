use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use ethcache_core::{metrics::MetricsCollector, proxy::RpcProxy};
use std::sync::Arc;

use crate::middleware;

/// Shared handler state: the proxy pipeline and the metrics collector.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<RpcProxy>,
    pub metrics: Arc<MetricsCollector>,
}

/// Assembles the application router.
///
/// `/` (POST) and `/metrics` sit behind bearer auth when `auth_token` is
/// non-empty; `/health` is always public. Any non-POST method on `/` is
/// rejected by the method router with 405.
pub fn create_app(state: AppState, auth_token: &str) -> Router {
    let public = Router::new().route("/health", get(handle_health));

    let mut protected = Router::new()
        .route("/", post(handle_rpc))
        .route("/metrics", get(handle_metrics))
        .with_state(state);

    if !auth_token.is_empty() {
        let token = Arc::new(auth_token.to_string());
        protected = protected
            .layer(axum_middleware::from_fn_with_state(token, middleware::bearer_auth_middleware));
    }

    public.merge(protected)
}

async fn handle_rpc(State(state): State<AppState>, request: Request<Body>) -> Response {
    let body = match to_bytes(request.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to read body").into_response()
        }
    };
    state.proxy.handle(body).await
}

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
