//! Fixed-window rate limiter.
//!
//! Cheaper than the sliding window (one counter per key instead of one
//! timestamp per admission) but a caller can be admitted up to twice the
//! quota across a window boundary.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::eviction::{Evict, EvictionHandle};
use super::limit::LimitConfig;
use super::stats::{StatsCollector, StatsSnapshot};

/// A counter of admissions within one fixed window.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    /// Admissions in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    /// Start a fresh window if the current one has lapsed.
    fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        if self.is_expired(now, window) {
            self.count = 0;
            self.window_start = now;
        }
    }

    /// Count one admission if under `limit`.
    fn try_increment(&mut self, limit: u64) -> bool {
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Admissions counted against the window containing `now`.
    fn current_count(&self, now: Instant, window: Duration) -> u64 {
        if self.is_expired(now, window) {
            0
        } else {
            self.count
        }
    }
}

/// Rate limiter that counts admissions in consecutive fixed windows per key.
///
/// Each key's first request opens its window; the count resets once
/// `window_size` has passed since then.
pub struct FixedWindowLimiter {
    /// Counters indexed by key
    counters: RwLock<HashMap<String, WindowCounter>>,
    /// Aggregate decision counters
    stats: StatsCollector,
    /// Configured limits
    config: LimitConfig,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    /// Create a limiter on the system clock and start its eviction sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: LimitConfig) -> (Arc<Self>, EvictionHandle) {
        let period = config.cleanup_interval();
        let limiter = Arc::new(Self::new(config));
        let handle = EvictionHandle::spawn(Arc::downgrade(&limiter), period);
        (limiter, handle)
    }

    /// Create a limiter on the system clock without a background sweep.
    pub fn new(config: LimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on a custom clock without a background sweep.
    pub fn with_clock(config: LimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            stats: StatsCollector::new(),
            config,
            clock,
        }
    }

    /// Decide whether a request for `key` may proceed.
    pub fn is_allowed(&self, key: &str) -> bool {
        let window = self.config.window_size();
        let limit = self.config.requests_per_window();

        let within_limit = {
            let mut counters = self.counters.write();
            let now = self.clock.now();

            let counter = counters.entry(key.to_string()).or_insert_with(|| {
                trace!(key = %key, "Creating new window counter");
                WindowCounter::new(now)
            });
            counter.maybe_reset_window(now, window);
            counter.try_increment(limit)
        };

        if within_limit {
            self.stats.record_admitted(key);
        } else {
            debug!(key = %key, limit = limit, "Rate limit exceeded");
            self.stats.record_blocked(key);
        }
        within_limit
    }

    /// Admissions still available to `key` in its current window.
    pub fn remaining(&self, key: &str) -> i64 {
        let counters = self.counters.read();
        let now = self.clock.now();
        let used = counters
            .get(key)
            .map_or(0, |c| c.current_count(now, self.config.window_size()));
        self.config.requests_per_window() as i64 - used as i64
    }

    /// Discard the counter for `key`.
    pub fn reset(&self, key: &str) {
        self.counters.write().remove(key);
    }

    /// Copy of the aggregate counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Get the number of active counters.
    pub fn counter_count(&self) -> usize {
        self.counters.read().len()
    }
}

impl Evict for FixedWindowLimiter {
    fn evict_expired(&self) -> usize {
        let window = self.config.window_size();
        let mut counters = self.counters.write();
        let now = self.clock.now();
        let before = counters.len();
        counters.retain(|_, counter| !counter.is_expired(now, window));
        before - counters.len()
    }
}

impl RateLimiterBackend for FixedWindowLimiter {
    fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed(key)
    }

    fn remaining(&self, key: &str) -> i64 {
        self.remaining(key)
    }

    fn reset(&self, key: &str) {
        self.reset(key)
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats()
    }

    fn config(&self) -> &LimitConfig {
        &self.config
    }
}
