//! HTTP server hosting the admission layer.

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::{FloodgateError, Result};
use crate::middleware::{
    admission_middleware, request_logger, AdmissionState, DEFAULT_LOW_WATER_MARK,
};
use crate::ratelimit::{RateLimiterBackend, StatsSnapshot};

/// HTTP server that gates every route behind the rate limiter.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<dyn RateLimiterBackend>,
    /// Remaining quota that triggers a warning
    low_water_mark: i64,
    /// Downstream routes placed behind admission
    routes: Router,
}

impl HttpServer {
    /// Create a new server around `rate_limiter`.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<dyn RateLimiterBackend>) -> Self {
        Self {
            addr,
            rate_limiter,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            routes: Router::new(),
        }
    }

    /// Set the remaining-quota level at which admitted requests are logged.
    pub fn with_low_water_mark(mut self, low_water_mark: i64) -> Self {
        self.low_water_mark = low_water_mark;
        self
    }

    /// Add downstream routes. They are merged behind the admission layer.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Build the full router: built-in routes, downstream routes and the
    /// request pipeline.
    ///
    /// Requests pass through logging, admission, CORS and panic recovery, in
    /// that order, before reaching a handler.
    pub fn router(&self) -> Router {
        let admission = AdmissionState::new(self.rate_limiter.clone(), self.low_water_mark);

        Router::new()
            .route("/health", get(health))
            .route("/api/v1/ratelimit/stats", get(stats))
            .with_state(self.rate_limiter.clone())
            .merge(self.routes.clone())
            .layer(CatchPanicLayer::custom(handler_panicked))
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn_with_state(admission, admission_middleware))
            .layer(middleware::from_fn(request_logger))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            FloodgateError::Server(format!("failed to bind {}: {}", self.addr, e))
        })?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(rate_limiter): State<Arc<dyn RateLimiterBackend>>) -> Json<StatsSnapshot> {
    Json(rate_limiter.stats())
}

fn handler_panicked(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(panic = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimitConfig, SlidingWindowLimiter};

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let rate_limiter = Arc::new(SlidingWindowLimiter::new(LimitConfig::default()));
        let server = HttpServer::new(addr, rate_limiter).with_low_water_mark(3);
        assert_eq!(server.low_water_mark, 3);
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap();
        let rate_limiter = Arc::new(SlidingWindowLimiter::new(LimitConfig::default()));

        let result = HttpServer::new(addr, rate_limiter)
            .serve_with_shutdown(async {})
            .await;

        assert!(matches!(result, Err(FloodgateError::Server(_))));
    }
}
