//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the beacon client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Routing address of the beacon (chain or application ID).
    pub beacon_address: String,

    /// Deadline for every submit/query call, in milliseconds.
    pub request_timeout_ms: u64,

    /// Reconnection backoff settings.
    pub reconnection: ReconnectionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ClientConfig {
    /// Default configuration targeting `beacon_address`.
    pub fn new(beacon_address: impl Into<String>) -> Self {
        Self {
            beacon_address: beacon_address.into(),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            beacon_address: String::new(),
            request_timeout_ms: 30_000,
            reconnection: ReconnectionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Reconnection configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// Failed attempts allowed before giving up.
    pub max_attempts: u32,

    /// Delay before the first attempt, in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on the un-jittered delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in [1.0, 1.3].
    pub jitter: bool,
}

impl ReconnectionConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("beacon");
        assert_eq!(config.beacon_address, "beacon");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconnection.max_attempts, 10);
        assert_eq!(config.reconnection.base_delay(), Duration::from_secs(1));
        assert_eq!(config.reconnection.max_delay(), Duration::from_secs(30));
        assert_eq!(config.reconnection.backoff_multiplier, 2.0);
        assert!(config.reconnection.jitter);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            beacon_address = "e476187f6ddfeb9d588c7b45d3df334d5501d6499b3f9ad5595cae86cce16a65"
            request_timeout_ms = 5000

            [reconnection]
            max_attempts = 3
            jitter = false
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.reconnection.max_attempts, 3);
        assert!(!config.reconnection.jitter);
        assert_eq!(config.reconnection.base_delay_ms, 1_000);
        assert_eq!(config.observability.log_level, "info");
    }
}
