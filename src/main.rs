//! Beacon client demo.
//!
//! Drives a [`BeaconClient`] against the in-memory provider: initializes,
//! requests a few rounds of randomness, prints what arrives and looks the
//! last round up again by ID.
//!
//! ```text
//! beacon-demo --requests 5 --publish-delay-ms 100
//! beacon-demo --config beacon.toml --metrics
//! RUST_LOG=beacon_client=debug beacon-demo
//! ```

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use beacon_client::config::{load_config, validate_config, ClientConfig, ConfigError};
use beacon_client::observability::{logging, metrics};
use beacon_client::provider::{MockBehavior, MockProvider};
use beacon_client::{BeaconClient, RandomnessResult};

#[derive(Parser)]
#[command(name = "beacon-demo")]
#[command(about = "Request randomness from a simulated beacon", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Beacon routing address (overrides the config file)
    #[arg(short, long)]
    beacon_address: Option<String>,

    /// Number of randomness requests to submit
    #[arg(short = 'n', long, default_value_t = 3)]
    requests: usize,

    /// Delay before the simulated beacon publishes each round
    #[arg(long, default_value_t = 250)]
    publish_delay_ms: u64,

    /// Expose Prometheus metrics on the configured address
    #[arg(long)]
    metrics: bool,
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::new("beacon.local"),
    };
    if let Some(address) = &cli.beacon_address {
        config.beacon_address = address.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    if let Err(e) = logging::init_logging(&config.observability.log_level) {
        eprintln!("logging already initialized: {e}");
    }

    if cli.metrics || config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        beacon = %config.beacon_address,
        requests = cli.requests,
        request_timeout_ms = config.request_timeout_ms,
        "beacon-demo starting"
    );

    let provider = MockProvider::with_behavior(MockBehavior {
        publish_after: Some(Duration::from_millis(cli.publish_delay_ms)),
        ..MockBehavior::default()
    });
    let client = BeaconClient::new(config.clone(), Arc::new(provider));
    client.initialize().await?;

    let chain = client.chain_id().await?;
    tracing::info!(chain_id = %chain, "Connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<RandomnessResult>();
    for _ in 0..cli.requests {
        let tx = tx.clone();
        let request_id = client
            .request_randomness(move |result| {
                // Receiver may already be gone during shutdown.
                let _ = tx.send(result.clone());
                Ok(())
            })
            .await?;
        tracing::info!(request_id = %request_id, "Submitted");
    }
    drop(tx);

    // Every callback sees every round; keep one copy per round.
    let mut rounds = BTreeMap::new();
    let wait = config.request_timeout() + Duration::from_millis(cli.publish_delay_ms);
    while rounds.len() < cli.requests {
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(result)) => {
                rounds.entry(result.round_id).or_insert(result);
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(received = rounds.len(), "Timed out waiting for rounds");
                break;
            }
        }
    }

    for result in rounds.values() {
        println!("{}", serde_json::to_string_pretty(result)?);
    }

    if let Some(&last) = rounds.keys().next_back() {
        match client.get_randomness_by_round_id(last).await? {
            Some(stored) => tracing::info!(round_id = last, random_number = %stored.random_number, "Round verified"),
            None => tracing::warn!(round_id = last, "Round not found"),
        }
    }

    client.cleanup().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
