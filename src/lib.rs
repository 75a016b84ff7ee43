//! Client library for a verifiable randomness beacon.
//!
//! ```text
//!   caller ──▶ client ──▶ provider (ledger)
//!                ▲            │
//!                │            ▼
//!           subscription ◀── RandomnessPublished
//!
//!   cross-cutting: config, resilience, observability
//! ```

// Core
pub mod client;
pub mod provider;
pub mod subscription;

// Cross-cutting concerns
pub mod config;
pub mod observability;
pub mod resilience;

pub use client::{
    BeaconClient, ClientError, ClientResult, LifecycleState, RandomnessResult, RequestId,
};
pub use config::ClientConfig;
pub use provider::{BeaconProvider, MockProvider};
