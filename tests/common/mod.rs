//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use beacon_client::config::{ClientConfig, ReconnectionConfig};
use beacon_client::observability::logging;
use beacon_client::provider::{MockBehavior, MockProvider};
use beacon_client::BeaconClient;

/// Install a quiet subscriber once per test binary; set RUST_LOG to see output.
pub fn init_logging() {
    let _ = logging::init_logging("warn");
}

/// Config with short delays so paused-clock tests stay readable.
pub fn fast_config(request_timeout_ms: u64, max_attempts: u32) -> ClientConfig {
    ClientConfig {
        request_timeout_ms,
        reconnection: ReconnectionConfig {
            max_attempts,
            base_delay_ms: 10,
            max_delay_ms: 100,
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..ClientConfig::new("beacon.test")
    }
}

pub fn mock(behavior: MockBehavior) -> MockProvider {
    MockProvider::with_behavior(behavior)
}

pub fn client(config: ClientConfig, provider: &MockProvider) -> BeaconClient {
    init_logging();
    BeaconClient::new(config, Arc::new(provider.clone()))
}

/// Build a client with `fast_config` and initialize it.
pub async fn ready_client(provider: &MockProvider) -> BeaconClient {
    let client = client(fast_config(1_000, 3), provider);
    client.initialize().await.unwrap();
    client
}

/// Let spawned tasks and timers run.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}
