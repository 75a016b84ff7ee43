//! Beacon client subsystem.
//!
//! # Data Flow
//! ```text
//! request_randomness(callback)
//!     → callback stored under a fresh RequestId
//!     → RequestRandomness submitted (raced against request timeout)
//!     → RequestId returned
//!
//! provider publishes RandomnessPublished
//!     → subscription registry
//!     → beacon.rs dispatch
//!     → every registered callback (failures isolated)
//!
//! network failure / timeout
//!     → resilience::ReconnectionController
//!     → resubscribe, or Failed once attempts run out
//! ```
//!
//! # Design Decisions
//! - Callbacks live until cleanup() or cancel_request(); every round reaches all of them
//! - Lifecycle state sits behind a std Mutex that is never held across `.await`
//! - A timed-out provider call keeps running detached; its outcome is dropped

pub mod beacon;
pub mod types;

pub use beacon::BeaconClient;
pub use types::{
    BeaconRequest, CallbackError, CallbackResult, ClientError, ClientResult, ErrorKind,
    LifecycleState, RandomnessCallback, RandomnessResult, RequestId,
};
