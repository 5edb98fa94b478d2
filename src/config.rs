//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::middleware::DEFAULT_LOW_WATER_MARK;
use crate::ratelimit::LimitConfig;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per key within one window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    /// Sliding window length in seconds
    #[serde(default = "default_window_size")]
    pub window_size_secs: u64,

    /// Seconds between eviction sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Retry hint given to rejected callers, in seconds
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,

    /// Remaining quota at or below which admitted requests are logged
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: i64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_size_secs: default_window_size(),
            cleanup_interval_secs: default_cleanup_interval(),
            block_duration_secs: default_block_duration(),
            low_water_mark: default_low_water_mark(),
        }
    }
}

fn default_requests_per_window() -> u64 {
    100
}

fn default_window_size() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_block_duration() -> u64 {
    60
}

fn default_low_water_mark() -> i64 {
    DEFAULT_LOW_WATER_MARK
}

impl RateLimitingConfig {
    /// Convert into validated limiter settings.
    pub fn limit_config(&self) -> Result<LimitConfig> {
        LimitConfig::new(
            self.requests_per_window,
            Duration::from_secs(self.window_size_secs),
            Duration::from_secs(self.cleanup_interval_secs),
            Duration::from_secs(self.block_duration_secs),
        )
    }
}

impl FloodgateConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    ///
    /// Environment variables use the `FLOODGATE` prefix and `__` between
    /// sections, e.g. `FLOODGATE__RATE_LIMITING__REQUESTS_PER_WINDOW=50`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: FloodgateConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.rate_limiting.limit_config().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.rate_limiting.requests_per_window, 100);
        assert_eq!(config.rate_limiting.low_water_mark, 10);

        let limits = config.rate_limiting.limit_config().unwrap();
        assert_eq!(limits, LimitConfig::default());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
rate_limiting:
  requests_per_window: 5
  window_size_secs: 10
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.requests_per_window, 5);
        assert_eq!(config.rate_limiting.window_size_secs, 10);
        assert_eq!(config.rate_limiting.cleanup_interval_secs, 60);
        assert_eq!(config.server.http_addr, default_http_addr());

        let limits = config.rate_limiting.limit_config().unwrap();
        assert_eq!(limits.window_size(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_yaml_rejects_zero_quota() {
        let yaml = r#"
rate_limiting:
  requests_per_window: 0
"#;
        let result = FloodgateConfig::from_yaml(yaml);
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_from_yaml_invalid() {
        let result = FloodgateConfig::from_yaml("server: [not, a, map]");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("floodgate-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "server:\n  http_addr: \"127.0.0.1:9191\"\nrate_limiting:\n  block_duration_secs: 15\n",
        )
        .unwrap();

        let config = FloodgateConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.http_addr.port(), 9191);
        assert_eq!(config.rate_limiting.block_duration_secs, 15);
        assert_eq!(config.rate_limiting.requests_per_window, 100);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("floodgate-does-not-exist.yaml");
        let result = FloodgateConfig::load(Some(&path));
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }
}
