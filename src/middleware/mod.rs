//! HTTP middleware placing the limiter in front of downstream handlers.

mod admission;
mod key;
mod logging;

pub use admission::{
    admission_middleware, format_duration, rejection_response, AdmissionState, RejectionBody,
    DEFAULT_LOW_WATER_MARK,
};
pub use key::{client_key, peer_host, FORWARDED_FOR, REAL_IP};
pub use logging::request_logger;
