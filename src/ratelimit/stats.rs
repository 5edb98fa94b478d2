//! Aggregate admission counters.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Point-in-time copy of the collector's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Every decision observed, admitted or blocked
    pub total_requests: u64,
    /// Decisions that denied the request
    pub blocked_requests: u64,
    /// `blocked / total * 100`, or 0 when nothing has been observed
    pub blocked_requests_percentage: f64,
    /// Observed requests per key
    pub top_keys: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    blocked: u64,
    per_key: HashMap<String, u64>,
}

/// Thread-safe counters updated on every limiter decision.
///
/// Guarded by its own lock, independent of any limiter state.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl StatsCollector {
    /// Create a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that was let through.
    pub fn record_admitted(&self, key: &str) {
        self.record(key, false);
    }

    /// Record a request that was turned away.
    pub fn record_blocked(&self, key: &str) {
        self.record(key, true);
    }

    fn record(&self, key: &str, blocked: bool) {
        let mut counters = self.counters.lock();
        counters.total += 1;
        if blocked {
            counters.blocked += 1;
        }
        *counters.per_key.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.lock();
        StatsSnapshot {
            total_requests: counters.total,
            blocked_requests: counters.blocked,
            blocked_requests_percentage: blocked_percentage(counters.blocked, counters.total),
            top_keys: counters
                .per_key
                .iter()
                .map(|(key, hits)| (key.clone(), *hits))
                .collect(),
        }
    }
}

fn blocked_percentage(blocked: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    blocked as f64 / total as f64 * 100.0
}
