//! In-memory beacon provider.
//!
//! Keeps published rounds in a `BTreeMap` keyed by round ID and delivers
//! `RandomnessPublished` events to subscribers synchronously. Failure knobs in
//! [`MockBehavior`] let tests inject latency, rejections and transport faults.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::provider::contract::{BeaconProvider, EventHandler};
use crate::provider::types::{
    AccountInfo, ChainId, EventType, Operation, ProviderError, ProviderResult, Query,
    QueryResponse, RandomnessEvent, SubscriptionId, TransactionResult,
};

/// Length of the fake attestation attached to generated rounds.
const ATTESTATION_LEN: usize = 64;

/// How `subscribe_to_events` should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeFailure {
    #[default]
    Never,
    Always,
    /// Refuse every call at the ledger level rather than the transport.
    Rejected,
    /// Fail the next `n` calls, then succeed.
    Times(u32),
}

/// Injected behavior for [`MockProvider`].
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Latency before `submit_transaction` resolves.
    pub submit_delay: Duration,
    /// Latency before `query` resolves.
    pub query_delay: Duration,
    /// Resolve submissions with `success: false`.
    pub reject_submissions: bool,
    /// Fail submissions with a transport error.
    pub submit_transport_failure: bool,
    /// Fail queries with a transport error.
    pub query_transport_failure: bool,
    pub subscribe_failure: SubscribeFailure,
    /// Publish a fresh round this long after each accepted request.
    pub publish_after: Option<Duration>,
}

struct Subscriber {
    event_type: EventType,
    handler: EventHandler,
}

struct MockInner {
    chain_id: ChainId,
    account: AccountInfo,
    behavior: Mutex<MockBehavior>,
    rounds: Mutex<BTreeMap<u64, RandomnessEvent>>,
    next_round: AtomicU64,
    subscribers: DashMap<SubscriptionId, Subscriber>,
    submit_calls: AtomicU32,
    completed_submissions: AtomicU32,
    query_calls: AtomicU32,
    subscribe_calls: AtomicU32,
    unsubscribe_calls: AtomicU32,
}

impl MockInner {
    fn behavior(&self) -> MutexGuard<'_, MockBehavior> {
        self.behavior.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rounds(&self) -> MutexGuard<'_, BTreeMap<u64, RandomnessEvent>> {
        self.rounds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_event(&self) -> RandomnessEvent {
        let round_id = self.next_round.fetch_add(1, Ordering::SeqCst);
        let mut rng = rand::thread_rng();
        let mut random_number = [0u8; 32];
        let mut nonce = [0u8; 16];
        let mut attestation = vec![0u8; ATTESTATION_LEN];
        rng.fill(&mut random_number);
        rng.fill(&mut nonce);
        rng.fill(&mut attestation[..]);
        RandomnessEvent {
            round_id,
            random_number,
            nonce,
            attestation,
        }
    }

    fn publish(&self, event: RandomnessEvent) -> usize {
        self.rounds().insert(event.round_id, event.clone());

        // Handlers may call back into the provider; never hold the map guard while dispatching.
        let handlers: Vec<EventHandler> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().event_type == EventType::RandomnessPublished)
            .map(|entry| entry.value().handler.clone())
            .collect();

        tracing::debug!(
            round_id = event.round_id,
            subscribers = handlers.len(),
            "Mock: publishing round"
        );

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }
}

/// In-memory [`BeaconProvider`] used by tests and the demo binary.
#[derive(Clone)]
pub struct MockProvider {
    inner: Arc<MockInner>,
}

impl MockProvider {
    /// Create a provider that succeeds at everything immediately.
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            inner: Arc::new(MockInner {
                chain_id: ChainId::from("mock-chain"),
                account: AccountInfo {
                    owner: "mock-owner".to_string(),
                    balance: 100,
                },
                behavior: Mutex::new(behavior),
                rounds: Mutex::new(BTreeMap::new()),
                next_round: AtomicU64::new(1),
                subscribers: DashMap::new(),
                submit_calls: AtomicU32::new(0),
                completed_submissions: AtomicU32::new(0),
                query_calls: AtomicU32::new(0),
                subscribe_calls: AtomicU32::new(0),
                unsubscribe_calls: AtomicU32::new(0),
            }),
        }
    }

    /// Change injected behavior in place.
    pub fn configure(&self, f: impl FnOnce(&mut MockBehavior)) {
        f(&mut self.inner.behavior());
    }

    /// Generate a round with random content and deliver it to subscribers.
    pub fn publish_round(&self) -> RandomnessEvent {
        let event = self.inner.next_event();
        self.inner.publish(event.clone());
        event
    }

    /// Deliver a specific event. Returns the number of subscribers reached.
    pub fn publish(&self, event: RandomnessEvent) -> usize {
        self.inner.publish(event)
    }

    pub fn submit_calls(&self) -> u32 {
        self.inner.submit_calls.load(Ordering::SeqCst)
    }

    /// Submissions that ran to completion, including ones the caller stopped waiting for.
    pub fn completed_submissions(&self) -> u32 {
        self.inner.completed_submissions.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> u32 {
        self.inner.query_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> u32 {
        self.inner.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("chain_id", &self.inner.chain_id)
            .field("subscribers", &self.inner.subscribers.len())
            .field("rounds", &self.inner.rounds().len())
            .finish()
    }
}

#[async_trait]
impl BeaconProvider for MockProvider {
    async fn submit_transaction(
        &self,
        operation: Operation,
        _routing_address: &str,
    ) -> ProviderResult<TransactionResult> {
        self.inner.submit_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.inner.behavior().clone();

        if !behavior.submit_delay.is_zero() {
            tokio::time::sleep(behavior.submit_delay).await;
        }
        self.inner.completed_submissions.fetch_add(1, Ordering::SeqCst);

        if behavior.submit_transport_failure {
            return Err(ProviderError::Transport("connection reset by peer".to_string()));
        }
        if behavior.reject_submissions {
            return Ok(TransactionResult::failed("beacon rejected request"));
        }

        let Operation::RequestRandomness { request_id, .. } = operation;
        tracing::debug!(request_id = %request_id, "Mock: accepted randomness request");

        if let Some(delay) = behavior.publish_after {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let event = inner.next_event();
                inner.publish(event);
            });
        }

        Ok(TransactionResult::ok(format!("mock_tx_{}", request_id)))
    }

    async fn query(&self, query: Query, _routing_address: &str) -> ProviderResult<QueryResponse> {
        self.inner.query_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.inner.behavior().clone();

        if !behavior.query_delay.is_zero() {
            tokio::time::sleep(behavior.query_delay).await;
        }
        if behavior.query_transport_failure {
            return Err(ProviderError::Transport("query endpoint unreachable".to_string()));
        }

        let Query::GetRandomness { round_id } = query;
        Ok(QueryResponse {
            result: self.inner.rounds().get(&round_id).cloned(),
        })
    }

    async fn subscribe_to_events(
        &self,
        event_type: EventType,
        _routing_address: &str,
        handler: EventHandler,
    ) -> ProviderResult<SubscriptionId> {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut behavior = self.inner.behavior();
            match behavior.subscribe_failure {
                SubscribeFailure::Never => {}
                SubscribeFailure::Always => {
                    return Err(ProviderError::Transport("event stream unavailable".to_string()));
                }
                SubscribeFailure::Rejected => {
                    return Err(ProviderError::Rejected("subscriptions disabled".to_string()));
                }
                SubscribeFailure::Times(n) => {
                    behavior.subscribe_failure = if n <= 1 {
                        SubscribeFailure::Never
                    } else {
                        SubscribeFailure::Times(n - 1)
                    };
                    if n > 0 {
                        return Err(ProviderError::Transport(
                            "event stream unavailable".to_string(),
                        ));
                    }
                }
            }
        }

        let id = SubscriptionId(Uuid::new_v4().to_string());
        self.inner
            .subscribers
            .insert(id.clone(), Subscriber { event_type, handler });
        Ok(id)
    }

    async fn unsubscribe_from_events(&self, subscription_id: &SubscriptionId) -> ProviderResult<()> {
        self.inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.inner.subscribers.remove(subscription_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::Rejected(format!(
                "unknown subscription {}",
                subscription_id
            ))),
        }
    }

    async fn get_chain_id(&self) -> ProviderResult<ChainId> {
        Ok(self.inner.chain_id.clone())
    }

    async fn get_account(&self) -> ProviderResult<AccountInfo> {
        Ok(self.inner.account.clone())
    }
}
