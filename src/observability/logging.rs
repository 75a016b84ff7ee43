//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable via `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Library code only emits events; installing a subscriber is the caller's choice

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("beacon_client={level},beacon_demo={level}")
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed; callers that may run twice
/// (tests) can ignore the error.
pub fn init_logging(level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
