//! Ledger provider boundary.
//!
//! # Data Flow
//! ```text
//! BeaconClient
//!     → contract.rs (BeaconProvider trait: submit, query, subscribe, unsubscribe)
//!     → provider implementation (external, or mock.rs for tests and the demo)
//!     → EventHandler callbacks carry RandomnessPublished events back
//! ```
//!
//! # Design Decisions
//! - Provider calls are not assumed cancellable
//! - Payloads are tagged enums, never untyped JSON
//! - Errors are classified into the client taxonomy by the caller, not here

pub mod contract;
pub mod mock;
pub mod types;

pub use contract::{BeaconProvider, EventHandler};
pub use mock::{MockBehavior, MockProvider, SubscribeFailure};
pub use types::{
    AccountInfo, ChainId, EventType, Operation, ProviderError, ProviderResult, Query,
    QueryResponse, RandomnessEvent, SubscriptionId, TransactionResult,
};
