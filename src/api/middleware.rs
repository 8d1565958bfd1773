//! Middleware for the HTTP API

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request logging middleware
///
/// Logs each request on arrival and its status and latency on completion.
/// Server errors are logged at warn level.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let method = req.method().clone();
    let uri = req.uri().clone();

    debug!("Incoming request: {} {}", method, uri);

    let response = next.run(req).await;

    let status = response.status();
    let process_time = start_time.elapsed().as_secs_f64();

    if status.is_server_error() {
        warn!(
            "Request failed: {} {} status={} time={:.3}s",
            method, uri, status, process_time
        );
    } else {
        info!(
            "Request completed: {} {} status={} time={:.3}s",
            method, uri, status, process_time
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_logging_middleware_passes_through() {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn(logging_middleware));

        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
