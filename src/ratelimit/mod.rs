//! Rate limiting logic and state management.

mod backend;
pub mod clock;
mod eviction;
mod fixed;
mod limit;
mod limiter;
mod stats;
mod store;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use eviction::{Evict, EvictionHandle};
pub use fixed::FixedWindowLimiter;
pub use limit::LimitConfig;
pub use limiter::SlidingWindowLimiter;
pub use stats::{StatsCollector, StatsSnapshot};
pub use store::{Admission, WindowStore};
