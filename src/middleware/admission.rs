//! Admission middleware for axum routers.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::key::client_key;
use crate::ratelimit::{RateLimiterBackend, StatsSnapshot};

/// Remaining quota at or below which an admitted request is logged.
pub const DEFAULT_LOW_WATER_MARK: i64 = 10;

/// Shared state for [`admission_middleware`].
#[derive(Clone)]
pub struct AdmissionState {
    limiter: Arc<dyn RateLimiterBackend>,
    low_water_mark: i64,
}

impl AdmissionState {
    /// Create admission state over `limiter`.
    pub fn new(limiter: Arc<dyn RateLimiterBackend>, low_water_mark: i64) -> Self {
        Self {
            limiter,
            low_water_mark,
        }
    }

    /// The limiter this state consults.
    pub fn limiter(&self) -> &Arc<dyn RateLimiterBackend> {
        &self.limiter
    }
}

/// Body of a `429 Too Many Requests` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionBody {
    pub error: String,
    pub retry_after: u64,
    pub limit: u64,
    pub window_size: String,
    pub stats: StatsSnapshot,
    pub ip: String,
}

/// Gate a request on the limiter before it reaches `next`.
///
/// Makes exactly one limiter decision. Rejected requests get a 429 with a
/// `Retry-After` header and never reach the downstream handler.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());
    let key = client_key(request.headers(), peer.as_deref());

    if !state.limiter.is_allowed(&key) {
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        warn!(
            ip = %key,
            method = %request.method(),
            path = %request.uri().path(),
            user_agent = %user_agent,
            "Request blocked by rate limiter"
        );
        return rejection_response(state.limiter.as_ref(), key);
    }

    let remaining = state.limiter.remaining(&key);
    if remaining <= state.low_water_mark {
        warn!(
            ip = %key,
            method = %request.method(),
            path = %request.uri().path(),
            remaining = remaining,
            "Rate limit is close to the limit"
        );
    }

    next.run(request).await
}

/// Build the 429 response for a rejected `key`.
pub fn rejection_response(limiter: &dyn RateLimiterBackend, key: String) -> Response {
    let config = limiter.config();
    let retry_after = config.retry_after_secs();

    let body = RejectionBody {
        error: "Rate limit exceeded".to_string(),
        retry_after,
        limit: config.requests_per_window(),
        window_size: format_duration(config.window_size()),
        stats: limiter.stats(),
        ip: key,
    };

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Render a duration the way it appears in rejection bodies, e.g. `60s`.
pub fn format_duration(duration: Duration) -> String {
    format!("{:?}", duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimitConfig, SlidingWindowLimiter};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(60)), "60s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[tokio::test]
    async fn test_rejection_response_shape() {
        let config = LimitConfig::new(
            1,
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
        .unwrap();
        let limiter = SlidingWindowLimiter::new(config);
        limiter.is_allowed("198.51.100.4");
        limiter.is_allowed("198.51.100.4");

        let response = rejection_response(&limiter, "198.51.100.4".to_string());

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: RejectionBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "Rate limit exceeded");
        assert_eq!(body.retry_after, 30);
        assert_eq!(body.limit, 1);
        assert_eq!(body.window_size, "60s");
        assert_eq!(body.ip, "198.51.100.4");
        assert_eq!(body.stats.total_requests, 2);
        assert_eq!(body.stats.blocked_requests, 1);
    }

    #[test]
    fn test_sub_second_block_never_advertises_zero() {
        let config = LimitConfig::new(
            1,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_millis(500),
        )
        .unwrap();
        let limiter = SlidingWindowLimiter::new(config);
        limiter.is_allowed("k");
        limiter.is_allowed("k");

        let response = rejection_response(&limiter, "k".to_string());
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
