//! Event subscription management.
//!
//! # Data Flow
//! ```text
//! Provider event stream
//!     → EventHandler installed by BeaconClient
//!     → registry.rs (emit to every handler for the event type)
//!     → BeaconClient dispatch handler + user listeners
//! ```
//!
//! # Design Decisions
//! - Handlers are re-registered explicitly on every (re)subscription
//! - Handler failures are caught and logged, never propagated

pub mod registry;

pub use registry::{Handler, RegistrationId, SubscriptionRegistry};
