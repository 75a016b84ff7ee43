//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider call from BeaconClient:
//!     → timeouts.rs (race call against request timeout, detach loser)
//!     → On network/timeout failure: reconnect.rs (resubscribe with backoff)
//!     → backoff.rs (delay = min(base * mult^n, max) * jitter)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every provider call has a deadline
//! - Reconnection is serialized per client
//! - Jittered backoff prevents synchronized retry storms across clients

pub mod backoff;
pub mod reconnect;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use reconnect::ReconnectionController;
pub use timeouts::race_detached;
