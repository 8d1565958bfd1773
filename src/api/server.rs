//! Router assembly and the serving loop

use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{
    get_validator, health, list_subnet_validators, list_subnets, list_validators, status,
    trpc_get, trpc_post, update_subnet, update_validator_identity, AppState,
};
use crate::api::middleware::logging_middleware;
use crate::errors::{ApyError, ApyResult};
use crate::service::YieldService;

/// Build the router with every route and the middleware stack
pub fn build_router(service: Arc<YieldService>) -> Router {
    let request_timeout = service.config().server.request_timeout();
    router_with_timeout(AppState::new(service), request_timeout)
}

fn router_with_timeout(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/trpc/:procedures", get(trpc_get).post(trpc_post))
        .route("/api/validators", get(list_validators))
        .route("/api/validators/subnet/:subnet_id", get(list_subnet_validators))
        .route("/api/validators/:hotkey", get(get_validator))
        .route("/api/subnets", get(list_subnets))
        .route("/api/admin/update-subnet", post(update_subnet))
        .route("/api/admin/validator-identity", post(update_validator_identity))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind the configured address and serve until ctrl-c
pub async fn serve(service: Arc<YieldService>) -> ApyResult<()> {
    let addr = service.config().server.bind_addr();
    let router = build_router(service.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApyError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    info!(
        "APY server listening on {} (network: {}, endpoint: {})",
        addr,
        service.config().chain.network,
        service.endpoint()
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApyError::internal(format!("Server error: {}", e)))?;

    info!("APY server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
