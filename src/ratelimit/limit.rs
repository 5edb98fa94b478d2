//! Limit configuration shared by every limiter implementation.

use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Default number of requests admitted per window.
pub const DEFAULT_REQUESTS_PER_WINDOW: u64 = 100;
/// Default sliding window length.
pub const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(60);
/// Default period between eviction sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// Default retry hint handed to rejected callers.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(60);

/// Immutable limiter configuration.
///
/// Built once at startup through [`LimitConfig::new`], which rejects zero
/// quotas and zero durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitConfig {
    requests_per_window: u64,
    window_size: Duration,
    cleanup_interval: Duration,
    block_duration: Duration,
}

impl LimitConfig {
    /// Create a validated configuration.
    pub fn new(
        requests_per_window: u64,
        window_size: Duration,
        cleanup_interval: Duration,
        block_duration: Duration,
    ) -> Result<Self> {
        if requests_per_window == 0 {
            return Err(FloodgateError::Config(
                "requests_per_window must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("window_size", window_size),
            ("cleanup_interval", cleanup_interval),
            ("block_duration", block_duration),
        ] {
            if value.is_zero() {
                return Err(FloodgateError::Config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(Self {
            requests_per_window,
            window_size,
            cleanup_interval,
            block_duration,
        })
    }

    /// Maximum admissions per key within one window.
    pub fn requests_per_window(&self) -> u64 {
        self.requests_per_window
    }

    /// Length of the trailing window.
    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    /// Period between eviction sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Retry hint surfaced to rejected callers.
    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    /// `block_duration` in whole seconds, rounded up so a sub-second block
    /// never advertises an immediate retry.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.block_duration.as_secs();
        if self.block_duration.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window_size: DEFAULT_WINDOW_SIZE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            block_duration: DEFAULT_BLOCK_DURATION,
        }
    }
}
