//! Rate limiter trait for abstracting over admission algorithms.

use super::limit::LimitConfig;
use super::stats::StatsSnapshot;

/// Trait for rate limiter implementations.
///
/// The admission middleware only talks to this trait, so the sliding-window
/// limiter can be swapped for [`FixedWindowLimiter`](super::FixedWindowLimiter)
/// or any other algorithm without touching the HTTP layer. Every method is a
/// short, non-suspending critical section.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether a request for `key` may proceed, recording it if so.
    fn is_allowed(&self, key: &str) -> bool;

    /// Admissions still available to `key` in the current window.
    fn remaining(&self, key: &str) -> i64;

    /// Forget all history for `key`.
    fn reset(&self, key: &str);

    /// Copy of the aggregate counters.
    fn stats(&self) -> StatsSnapshot;

    /// The limits this backend enforces.
    fn config(&self) -> &LimitConfig;
}
