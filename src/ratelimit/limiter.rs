//! Sliding-window rate limiter.

use std::sync::Arc;
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::eviction::{Evict, EvictionHandle};
use super::limit::LimitConfig;
use super::stats::{StatsCollector, StatsSnapshot};
use super::store::{Admission, WindowStore};

/// The core rate limiter.
///
/// Counts the exact number of admissions per key in the trailing window that
/// ends at each call, so bursts at a window edge cannot exceed the quota.
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct SlidingWindowLimiter {
    /// Admitted timestamps indexed by key
    store: WindowStore,
    /// Aggregate decision counters
    stats: StatsCollector,
    /// Configured limits
    config: LimitConfig,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter on the system clock and start its eviction sweep.
    ///
    /// Must be called from within a tokio runtime. The sweep runs every
    /// `cleanup_interval` until the returned handle is stopped or the
    /// limiter is dropped.
    pub fn start(config: LimitConfig) -> (Arc<Self>, EvictionHandle) {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`SlidingWindowLimiter::start`] but on a custom clock.
    pub fn start_with_clock(
        config: LimitConfig,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, EvictionHandle) {
        let period = config.cleanup_interval();
        let limiter = Arc::new(Self::with_clock(config, clock));
        let handle = EvictionHandle::spawn(Arc::downgrade(&limiter), period);

        debug!(
            limit = limiter.config.requests_per_window(),
            window = ?limiter.config.window_size(),
            cleanup_interval = ?period,
            "Sliding window limiter started"
        );

        (limiter, handle)
    }

    /// Create a limiter on the system clock without a background sweep.
    pub fn new(config: LimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on a custom clock without a background sweep.
    pub fn with_clock(config: LimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: WindowStore::new(),
            stats: StatsCollector::new(),
            config,
            clock,
        }
    }

    /// Decide whether a request for `key` may proceed.
    pub fn is_allowed(&self, key: &str) -> bool {
        let admission = self.store.try_admit(
            key,
            self.clock.as_ref(),
            self.config.window_size(),
            self.config.requests_per_window(),
        );

        match admission {
            Admission::Admitted { in_window } => {
                trace!(key = %key, in_window = in_window, "Request admitted");
                self.stats.record_admitted(key);
                true
            }
            Admission::Rejected { in_window } => {
                debug!(
                    key = %key,
                    in_window = in_window,
                    limit = self.config.requests_per_window(),
                    "Rate limit exceeded"
                );
                self.stats.record_blocked(key);
                false
            }
        }
    }

    /// Admissions still available to `key`. Does not modify any state.
    pub fn remaining(&self, key: &str) -> i64 {
        let used = self
            .store
            .count_valid(key, self.clock.as_ref(), self.config.window_size());
        self.config.requests_per_window() as i64 - used as i64
    }

    /// Discard all history for `key`. Aggregate stats are kept.
    pub fn reset(&self, key: &str) {
        if self.store.remove(key) {
            debug!(key = %key, "Rate limit history reset");
        }
    }

    /// Copy of the aggregate counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The configured limits.
    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    /// Get the number of keys with live history.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

impl Evict for SlidingWindowLimiter {
    fn evict_expired(&self) -> usize {
        self.store.sweep(self.clock.as_ref(), self.config.window_size())
    }
}

impl RateLimiterBackend for SlidingWindowLimiter {
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
        self.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::time::Duration;

    fn test_config(limit: u64, window: Duration) -> LimitConfig {
        LimitConfig::new(limit, window, Duration::from_secs(1), Duration::from_secs(30)).unwrap()
    }

    fn limiter_with_clock(
        limit: u64,
        window: Duration,
    ) -> (SlidingWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = SlidingWindowLimiter::with_clock(test_config(limit, window), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_limiter_creation() {
        let limiter = SlidingWindowLimiter::new(LimitConfig::default());
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.remaining("anyone"), 100);
    }

    #[test]
    fn test_expiry_reopens_quota() {
        let (limiter, clock) = limiter_with_clock(3, Duration::from_secs(1));

        assert!(limiter.is_allowed("k"));
        assert!(limiter.is_allowed("k"));
        assert!(limiter.is_allowed("k"));
        assert!(!limiter.is_allowed("k"));

        clock.advance(Duration::from_millis(1100));
        assert!(limiter.is_allowed("k"));
    }

    #[test]
    fn test_window_slides_rather_than_resets() {
        let (limiter, clock) = limiter_with_clock(2, Duration::from_secs(1));

        assert!(limiter.is_allowed("k"));
        clock.advance(Duration::from_millis(900));
        assert!(limiter.is_allowed("k"));

        // Only the first admission has aged out at t=1.0s.
        clock.advance(Duration::from_millis(100));
        assert!(limiter.is_allowed("k"));
        assert!(!limiter.is_allowed("k"));

        clock.advance(Duration::from_millis(900));
        assert!(limiter.is_allowed("k"));
    }

    #[test]
    fn test_remaining_counts_admissions() {
        let (limiter, _clock) = limiter_with_clock(5, Duration::from_secs(1));

        for n in 1..=4 {
            assert!(limiter.is_allowed("k"));
            assert_eq!(limiter.remaining("k"), 5 - n);
        }
    }

    #[test]
    fn test_remaining_does_not_record() {
        let (limiter, _clock) = limiter_with_clock(2, Duration::from_secs(1));

        for _ in 0..10 {
            assert_eq!(limiter.remaining("k"), 2);
        }
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.stats().total_requests, 0);
    }

    #[test]
    fn test_blocked_calls_do_not_consume_quota() {
        let (limiter, clock) = limiter_with_clock(1, Duration::from_secs(1));

        assert!(limiter.is_allowed("k"));
        for _ in 0..5 {
            assert!(!limiter.is_allowed("k"));
        }
        assert_eq!(limiter.remaining("k"), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.remaining("k"), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter_with_clock(2, Duration::from_secs(1));

        assert!(limiter.is_allowed("a"));
        assert!(limiter.is_allowed("a"));
        assert!(!limiter.is_allowed("a"));

        assert!(limiter.is_allowed("b"));
        assert_eq!(limiter.remaining("b"), 1);
        assert_eq!(limiter.remaining("a"), 0);
    }

    #[test]
    fn test_reset_restores_full_quota() {
        let (limiter, _clock) = limiter_with_clock(2, Duration::from_secs(60));

        limiter.is_allowed("k");
        limiter.is_allowed("k");
        assert!(!limiter.is_allowed("k"));

        limiter.reset("k");
        assert_eq!(limiter.remaining("k"), 2);
        assert!(limiter.is_allowed("k"));

        // Unknown keys are a no-op.
        limiter.reset("never-seen");
    }

    #[test]
    fn test_stats_track_decisions() {
        let (limiter, _clock) = limiter_with_clock(2, Duration::from_secs(1));

        limiter.is_allowed("a");
        limiter.is_allowed("a");
        limiter.is_allowed("a");
        limiter.is_allowed("b");

        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.blocked_requests, 1);
        assert_eq!(stats.blocked_requests_percentage, 25.0);
        assert_eq!(stats.top_keys.get("a"), Some(&3));
        assert_eq!(stats.top_keys.get("b"), Some(&1));
    }

    #[test]
    fn test_evict_removes_idle_keys() {
        let (limiter, clock) = limiter_with_clock(5, Duration::from_secs(1));

        limiter.is_allowed("idle");
        clock.advance(Duration::from_millis(800));
        limiter.is_allowed("active");
        clock.advance(Duration::from_millis(300));

        assert_eq!(limiter.evict_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.remaining("active"), 4);
    }

    #[test]
    fn test_concurrent_same_key_respects_limit() {
        let config = test_config(50, Duration::from_secs(60));
        let limiter = Arc::new(SlidingWindowLimiter::new(config));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.is_allowed("shared")).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);

        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 320);
        assert_eq!(stats.blocked_requests, 270);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_eviction() {
        let config = LimitConfig::new(
            10,
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new());
        let (limiter, handle) = SlidingWindowLimiter::start_with_clock(config, clock.clone());

        assert!(limiter.is_allowed("k"));
        assert_eq!(limiter.tracked_keys(), 1);
        clock.advance(Duration::from_millis(600));

        // The sweep at t=1s finds the key idle for longer than the window.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(limiter.tracked_keys(), 0);

        handle.stop().await;
    }
}
