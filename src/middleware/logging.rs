//! Request logging middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Log method, path, status and latency for every request.
///
/// Each request runs inside a span carrying a fresh `request_id`, so the
/// admission warnings it triggers can be correlated with this line.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("request", request_id = %request_id);

    async move {
        let started = Instant::now();
        let response = next.run(request).await;

        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}
