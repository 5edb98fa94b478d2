//! Per-key history of admitted requests.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::clock::Clock;

/// Outcome of an admission attempt against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was recorded; `in_window` includes it.
    Admitted { in_window: usize },
    /// The key was already at quota; nothing was recorded.
    Rejected { in_window: usize },
}

impl Admission {
    /// Whether the request may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Map of key to the timestamps of its admitted requests.
///
/// A single reader/writer lock guards the whole map. Timestamps are read
/// from the clock while the write lock is held, so each key's sequence is
/// appended in chronological order.
#[derive(Debug, Default)]
pub struct WindowStore {
    entries: RwLock<HashMap<String, VecDeque<Instant>>>,
}

/// A timestamp is valid while it is strictly younger than the window.
fn is_valid(timestamp: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(timestamp) < window
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    history.retain(|&t| is_valid(t, now, window));
}

impl WindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune `key` and record a new timestamp if it is under `limit`.
    ///
    /// Expired timestamps are dropped whether or not the request is admitted.
    pub fn try_admit(
        &self,
        key: &str,
        clock: &dyn Clock,
        window: Duration,
        limit: u64,
    ) -> Admission {
        let mut entries = self.entries.write();
        let now = clock.now();

        let history = entries.entry(key.to_string()).or_default();
        prune(history, now, window);

        let in_window = history.len();
        if in_window as u64 >= limit {
            return Admission::Rejected { in_window };
        }

        history.push_back(now);
        Admission::Admitted {
            in_window: in_window + 1,
        }
    }

    /// Count the timestamps for `key` that are still inside the window.
    pub fn count_valid(&self, key: &str, clock: &dyn Clock, window: Duration) -> usize {
        let entries = self.entries.read();
        let now = clock.now();
        entries
            .get(key)
            .map_or(0, |history| {
                history.iter().filter(|&&t| is_valid(t, now, window)).count()
            })
    }

    /// Drop all history for `key`. Returns whether the key was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Prune every key and delete the ones left empty.
    ///
    /// Holds the write lock for the whole pass. Returns the number of keys
    /// removed.
    pub fn sweep(&self, clock: &dyn Clock, window: Duration) -> usize {
        let mut entries = self.entries.write();
        let now = clock.now();
        let before = entries.len();

        entries.retain(|_, history| {
            prune(history, now, window);
            !history.is_empty()
        });

        before - entries.len()
    }

    /// Whether the store currently tracks `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
