//! The provider trait the client is written against.

use async_trait::async_trait;
use std::sync::Arc;

use crate::provider::types::{
    AccountInfo, ChainId, EventType, Operation, ProviderResult, Query, QueryResponse,
    RandomnessEvent, SubscriptionId, TransactionResult,
};

/// Callback a provider invokes for every event on a subscription.
pub type EventHandler = Arc<dyn Fn(RandomnessEvent) + Send + Sync>;

/// Ledger operations the beacon client depends on.
///
/// Implementations must be safe to share across tasks; the client holds one
/// behind an `Arc` and calls it from spawned tasks.
#[async_trait]
pub trait BeaconProvider: Send + Sync {
    /// Submit a state-changing operation to `routing_address`.
    async fn submit_transaction(
        &self,
        operation: Operation,
        routing_address: &str,
    ) -> ProviderResult<TransactionResult>;

    /// Run a read-only query against `routing_address`.
    async fn query(&self, query: Query, routing_address: &str) -> ProviderResult<QueryResponse>;

    /// Register `handler` for `event_type` events from `routing_address`.
    async fn subscribe_to_events(
        &self,
        event_type: EventType,
        routing_address: &str,
        handler: EventHandler,
    ) -> ProviderResult<SubscriptionId>;

    /// Drop a subscription created by `subscribe_to_events`.
    async fn unsubscribe_from_events(&self, subscription_id: &SubscriptionId) -> ProviderResult<()>;

    /// Chain the provider is connected to.
    async fn get_chain_id(&self) -> ProviderResult<ChainId>;

    /// Account operations are signed with.
    async fn get_account(&self) -> ProviderResult<AccountInfo>;
}
