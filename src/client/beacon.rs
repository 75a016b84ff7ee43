//! Beacon client facade.
//!
//! # Responsibilities
//! - Own the provider handle, pending callbacks and the active subscription
//! - Enforce the request timeout on every provider call
//! - Hand network/timeout failures to the reconnection controller
//! - Fan published randomness out to every registered callback

use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::client::types::{
    epoch_millis, BeaconRequest, CallbackResult, ClientError, ClientResult, LifecycleState,
    RandomnessCallback, RandomnessResult, RequestId,
};
use crate::config::ClientConfig;
use crate::observability::metrics;
use crate::provider::{
    AccountInfo, BeaconProvider, ChainId, EventHandler, EventType, Operation, ProviderResult,
    Query, RandomnessEvent, SubscriptionId,
};
use crate::resilience::{calculate_backoff, race_detached, ReconnectionController};
use crate::subscription::{RegistrationId, SubscriptionRegistry};
use crate::subscription::registry::run_isolated;

/// Subscribe calls made per (re)subscription before giving up.
const SUBSCRIBE_RETRY_LIMIT: u32 = 3;
const SUBSCRIBE_BASE_DELAY_MS: u64 = 1_000;
const SUBSCRIBE_MAX_DELAY_MS: u64 = 30_000;

/// Mutable session state. Never held across an `.await`.
#[derive(Debug)]
struct Session {
    lifecycle: LifecycleState,
    subscription: Option<SubscriptionId>,
    dispatch: Option<RegistrationId>,
    /// Bumped by `cleanup()` so in-flight (re)subscriptions can tell they are stale.
    generation: u64,
    /// Generation whose reconnection hand-off is running, if any.
    reconnecting: Option<u64>,
}

struct ClientInner {
    config: ClientConfig,
    provider: Arc<dyn BeaconProvider>,
    callbacks: DashMap<RequestId, RandomnessCallback>,
    registry: SubscriptionRegistry<RandomnessEvent>,
    reconnector: ReconnectionController,
    session: Mutex<Session>,
    /// Mirrors `Session::lifecycle` for waiters.
    lifecycle_tx: watch::Sender<LifecycleState>,
}

/// Client for requesting randomness from a beacon through a ledger provider.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct BeaconClient {
    inner: Arc<ClientInner>,
}

impl BeaconClient {
    /// Create a client. No provider calls are made until [`initialize`](Self::initialize).
    pub fn new(config: ClientConfig, provider: Arc<dyn BeaconProvider>) -> Self {
        let reconnector = ReconnectionController::new(config.reconnection.clone());
        let (lifecycle_tx, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            inner: Arc::new(ClientInner {
                config,
                provider,
                callbacks: DashMap::new(),
                registry: SubscriptionRegistry::new(),
                reconnector,
                session: Mutex::new(Session {
                    lifecycle: LifecycleState::Uninitialized,
                    subscription: None,
                    dispatch: None,
                    generation: 0,
                    reconnecting: None,
                }),
                lifecycle_tx,
            }),
        }
    }

    /// Subscribe to published randomness and become ready.
    ///
    /// Network failures are retried, then handed to the reconnection
    /// controller; if that budget is spent too the client ends up `Failed`
    /// and this returns [`ClientError::Reconnection`].
    pub async fn initialize(&self) -> ClientResult<()> {
        let generation = {
            let mut session = self.inner.session();
            let current = session.lifecycle;
            match current {
                LifecycleState::Ready => return Ok(()),
                LifecycleState::Uninitialized => {
                    self.inner.set_lifecycle(&mut session, LifecycleState::Initializing)
                }
                other => return Err(ClientError::not_ready(other)),
            }
            session.generation
        };

        tracing::info!(beacon = %self.inner.config.beacon_address, "Initializing beacon client");

        match self.inner.subscribe_with_retry(generation).await {
            Ok(subscription) => {
                if !self.inner.commit_subscription(subscription, generation).await {
                    return Err(ClientError::Connection {
                        reason: "client was cleaned up during initialization".to_string(),
                    });
                }
            }
            Err(e) if e.is_network() => {
                tracing::warn!(error = %e, "Initial subscription failed, handing off to reconnection");
                self.inner.handle_connection_failure(generation).await?;
            }
            Err(e) => {
                self.inner.set_lifecycle_if(generation, LifecycleState::Uninitialized);
                tracing::error!(error = %e, "Beacon client initialization failed");
                return Err(e);
            }
        }

        if let Err(e) = self.inner.ready_generation() {
            // Never leave this session stuck in Initializing.
            self.inner
                .transition(generation, LifecycleState::Initializing, LifecycleState::Uninitialized);
            return Err(e);
        }
        tracing::info!("Beacon client ready");
        Ok(())
    }

    /// Ask the beacon for randomness.
    ///
    /// Returns the request ID once the provider accepts the operation. The
    /// value itself arrives later: `callback` runs for every round published
    /// while it stays registered.
    pub async fn request_randomness<F>(&self, callback: F) -> ClientResult<RequestId>
    where
        F: Fn(&RandomnessResult) -> CallbackResult + Send + Sync + 'static,
    {
        let request_id = RequestId::generate();
        // Checked and registered under one lock so cleanup() cannot slip in between.
        let generation = {
            let session = self.inner.session();
            if session.lifecycle != LifecycleState::Ready {
                return Err(ClientError::not_ready(session.lifecycle));
            }
            self.inner.callbacks.insert(request_id.clone(), Arc::new(callback));
            session.generation
        };
        metrics::record_pending_callbacks(self.inner.callbacks.len());

        let operation = Operation::RequestRandomness {
            request_id: request_id.to_string(),
            timestamp: epoch_millis(),
        };

        let started = Instant::now();
        let provider = self.inner.provider.clone();
        let address = self.inner.config.beacon_address.clone();
        let submitted = operation.clone();
        let outcome = race_detached(self.inner.config.request_timeout(), async move {
            provider.submit_transaction(submitted, &address).await
        })
        .await;

        let result = match outcome {
            Ok(Ok(response)) if response.success => Ok(()),
            Ok(Ok(response)) => Err(ClientError::Request {
                reason: response
                    .error
                    .clone()
                    .unwrap_or_else(|| "provider reported failure".to_string()),
                request: Box::new(BeaconRequest::Operation(operation)),
                response: Some(response),
            }),
            Ok(Err(e)) => Err(ClientError::from_provider(e, BeaconRequest::Operation(operation))),
            Err(e) => Err(e),
        };

        self.finish_call("request_randomness", started, &result, generation);
        match result {
            Ok(()) => {
                tracing::info!(request_id = %request_id, "Randomness requested");
                Ok(request_id)
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Randomness request failed");
                Err(e)
            }
        }
    }

    /// Look up the randomness published for `round_id`.
    ///
    /// Returns `None` if the beacon has no such round.
    pub async fn get_randomness_by_round_id(
        &self,
        round_id: u64,
    ) -> ClientResult<Option<RandomnessResult>> {
        let generation = self.inner.ready_generation()?;

        let query = Query::GetRandomness { round_id };
        let started = Instant::now();
        let provider = self.inner.provider.clone();
        let address = self.inner.config.beacon_address.clone();
        let sent = query.clone();
        let outcome = race_detached(self.inner.config.request_timeout(), async move {
            provider.query(sent, &address).await
        })
        .await;

        let result = match outcome {
            Ok(Ok(response)) => Ok(response.result.as_ref().map(RandomnessResult::from)),
            Ok(Err(e)) => Err(ClientError::from_provider(e, BeaconRequest::Query(query))),
            Err(e) => Err(e),
        };

        self.finish_call("get_randomness", started, &result, generation);
        if let Err(e) = &result {
            tracing::warn!(round_id, error = %e, "Randomness query failed");
        }
        result
    }

    /// Tear the session down.
    ///
    /// Unsubscribes, drops all callbacks and listeners, cancels pending
    /// reconnection and returns to `Uninitialized`. Never fails; safe to call
    /// repeatedly and from any state.
    pub async fn cleanup(&self) {
        let subscription = {
            let mut session = self.inner.session();
            session.generation += 1;
            session.reconnecting = None;
            self.inner.set_lifecycle(&mut session, LifecycleState::Uninitialized);
            session.dispatch = None;
            session.subscription.take()
        };

        self.inner.registry.clear();
        self.inner.callbacks.clear();
        self.inner.reconnector.reset();
        metrics::record_pending_callbacks(0);

        if let Some(id) = subscription {
            if let Err(e) = self.inner.provider.unsubscribe_from_events(&id).await {
                tracing::warn!(subscription = %id, error = %e, "Failed to unsubscribe during cleanup");
            }
        }

        tracing::info!("Beacon client cleaned up");
    }

    /// Stop delivering results to the callback registered for `request_id`.
    pub fn cancel_request(&self, request_id: &RequestId) -> bool {
        let removed = self.inner.callbacks.remove(request_id).is_some();
        metrics::record_pending_callbacks(self.inner.callbacks.len());
        removed
    }

    /// Register a listener for every published round, independent of requests.
    ///
    /// Listeners are dropped by [`cleanup`](Self::cleanup).
    pub fn on_randomness<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&RandomnessResult) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner
            .registry
            .subscribe(EventType::RandomnessPublished, move |event: &RandomnessEvent| {
                listener(&RandomnessResult::from(event))
            })
    }

    /// Remove a listener added with [`on_randomness`](Self::on_randomness).
    pub fn remove_listener(&self, id: &RegistrationId) -> bool {
        self.inner.registry.unsubscribe(id)
    }

    /// Chain the provider is connected to.
    pub async fn chain_id(&self) -> ProviderResult<ChainId> {
        self.inner.provider.get_chain_id().await
    }

    /// Account the provider signs with.
    pub async fn account(&self) -> ProviderResult<AccountInfo> {
        self.inner.provider.get_account().await
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.session().lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Callbacks currently registered.
    pub fn pending_requests(&self) -> usize {
        self.inner.callbacks.len()
    }

    /// Failed attempts of the running hand-off, or of the one that exhausted the budget.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnector.attempts()
    }

    pub fn active_subscription(&self) -> Option<SubscriptionId> {
        self.inner.session().subscription.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<LifecycleState> {
        self.inner.lifecycle_tx.subscribe()
    }

    /// Wait until the client is `Ready`.
    ///
    /// Returns false if it reaches `Failed` first or `deadline` elapses.
    pub async fn wait_ready(&self, deadline: Duration) -> bool {
        let mut states = self.state_changes();
        let settled =
            states.wait_for(|s| matches!(s, LifecycleState::Ready | LifecycleState::Failed));
        let ready = match tokio::time::timeout(deadline, settled).await {
            Ok(Ok(state)) => *state == LifecycleState::Ready,
            _ => false,
        };
        ready
    }

    /// Record the outcome of a provider call and start self-healing if needed.
    fn finish_call<T>(
        &self,
        operation: &'static str,
        started: Instant,
        result: &ClientResult<T>,
        generation: u64,
    ) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::record_request(operation, outcome, started);

        if let Err(e) = result {
            if e.triggers_reconnect() {
                self.spawn_recovery(generation);
            }
        }
    }

    fn spawn_recovery(&self, generation: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.handle_connection_failure(generation).await {
                tracing::error!(error = %e, "Background reconnection failed");
            }
        });
    }
}

impl std::fmt::Debug for BeaconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconClient")
            .field("beacon_address", &self.inner.config.beacon_address)
            .field("state", &self.state())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

impl ClientInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every lifecycle change goes through here, under the session lock.
    fn set_lifecycle(&self, session: &mut Session, lifecycle: LifecycleState) {
        session.lifecycle = lifecycle;
        self.lifecycle_tx.send_replace(lifecycle);
    }

    fn set_lifecycle_if(&self, generation: u64, lifecycle: LifecycleState) {
        let mut session = self.session();
        if session.generation == generation {
            self.set_lifecycle(&mut session, lifecycle);
        }
    }

    /// Move `from` to `to`, only within `generation`.
    fn transition(&self, generation: u64, from: LifecycleState, to: LifecycleState) -> bool {
        let mut session = self.session();
        if session.generation == generation && session.lifecycle == from {
            self.set_lifecycle(&mut session, to);
            true
        } else {
            false
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session().generation == generation
    }

    fn ready_generation(&self) -> ClientResult<u64> {
        let session = self.session();
        match session.lifecycle {
            LifecycleState::Ready => Ok(session.generation),
            other => Err(ClientError::not_ready(other)),
        }
    }

    /// One provider subscribe call feeding events into the registry.
    async fn subscribe_once(self: &Arc<Self>) -> ClientResult<SubscriptionId> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handler: EventHandler = Arc::new(move |event: RandomnessEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.registry.emit(EventType::RandomnessPublished, &event);
            }
        });

        self.provider
            .subscribe_to_events(
                EventType::RandomnessPublished,
                &self.config.beacon_address,
                handler,
            )
            .await
            .map_err(ClientError::from_subscribe)
    }

    /// Subscribe, retrying network failures with `min(1000 * 2^n, 30000)` ms backoff.
    ///
    /// Gives up with a `Connection` error once `generation` goes stale.
    async fn subscribe_with_retry(self: &Arc<Self>, generation: u64) -> ClientResult<SubscriptionId> {
        let mut last_error = None;

        for attempt in 0..SUBSCRIBE_RETRY_LIMIT {
            if attempt > 0 {
                let delay = calculate_backoff(
                    attempt - 1,
                    SUBSCRIBE_BASE_DELAY_MS,
                    SUBSCRIBE_MAX_DELAY_MS,
                    2.0,
                    false,
                );
                tokio::time::sleep(delay).await;
            }
            if !self.is_current(generation) {
                return Err(ClientError::Connection {
                    reason: "client was cleaned up while subscribing".to_string(),
                });
            }

            match self.subscribe_once().await {
                Ok(id) => {
                    tracing::debug!(subscription = %id, attempt = attempt + 1, "Subscribed to RandomnessPublished");
                    return Ok(id);
                }
                Err(e) if e.is_network() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = SUBSCRIBE_RETRY_LIMIT,
                        error = %e,
                        "Subscription attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(ClientError::Network { cause: None }))
    }

    /// Install `subscription` as the active one and become ready.
    ///
    /// If `cleanup()` ran since `generation` was read, the subscription is
    /// released instead and false is returned.
    async fn commit_subscription(self: &Arc<Self>, subscription: SubscriptionId, generation: u64) -> bool {
        let committed = {
            let mut session = self.session();
            if session.generation == generation {
                if let Some(old) = session.dispatch.take() {
                    self.registry.unsubscribe(&old);
                }
                let weak = Arc::downgrade(self);
                session.dispatch = Some(self.registry.subscribe(
                    EventType::RandomnessPublished,
                    move |event: &RandomnessEvent| {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_beacon_event(event);
                        }
                        Ok(())
                    },
                ));
                session.subscription = Some(subscription.clone());
                self.set_lifecycle(&mut session, LifecycleState::Ready);
                true
            } else {
                false
            }
        };

        if !committed {
            tracing::info!(subscription = %subscription, "Releasing subscription created after cleanup");
            if let Err(e) = self.provider.unsubscribe_from_events(&subscription).await {
                tracing::warn!(subscription = %subscription, error = %e, "Failed to release subscription");
            }
        }
        committed
    }

    /// Deliver one published round to every registered callback.
    fn handle_beacon_event(&self, event: &RandomnessEvent) {
        let result = RandomnessResult::from(event);
        let callbacks: Vec<(RequestId, RandomnessCallback)> = self
            .callbacks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        metrics::record_event_dispatched();
        tracing::debug!(
            round_id = result.round_id,
            callbacks = callbacks.len(),
            "Dispatching published randomness"
        );

        for (request_id, callback) in callbacks {
            if let Err(reason) = run_isolated(|| callback(&result)) {
                metrics::record_callback_failure();
                tracing::error!(
                    request_id = %request_id,
                    round_id = result.round_id,
                    error = %reason,
                    "Randomness callback failed"
                );
            }
        }
    }

    /// Reconnect action: drop the stale subscription and subscribe again.
    async fn resubscribe(self: &Arc<Self>, generation: u64) -> ClientResult<()> {
        let stale = {
            let mut session = self.session();
            if session.generation != generation {
                return Err(ClientError::Connection {
                    reason: "client was cleaned up during reconnection".to_string(),
                });
            }
            session.subscription.take()
        };

        if let Some(id) = stale {
            if let Err(e) = self.provider.unsubscribe_from_events(&id).await {
                tracing::debug!(subscription = %id, error = %e, "Stale subscription already gone");
            }
        }

        let subscription = self.subscribe_with_retry(generation).await?;
        if self.commit_subscription(subscription, generation).await {
            Ok(())
        } else {
            Err(ClientError::Connection {
                reason: "client was cleaned up during reconnection".to_string(),
            })
        }
    }

    /// Run the reconnection hand-off for a failure seen in `origin`.
    ///
    /// Returns at once if `origin` is no longer the current session or a
    /// hand-off for this session is already running.
    async fn handle_connection_failure(self: &Arc<Self>, origin: u64) -> ClientResult<()> {
        let generation = {
            let mut session = self.session();
            if session.generation != origin {
                tracing::debug!("Ignoring failure from a previous session");
                return Ok(());
            }
            if session.reconnecting == Some(origin) {
                tracing::debug!("Reconnection already in progress");
                return Ok(());
            }
            let current = session.lifecycle;
            match current {
                LifecycleState::Ready | LifecycleState::Initializing => {
                    session.reconnecting = Some(origin);
                    self.set_lifecycle(&mut session, LifecycleState::Reconnecting);
                    origin
                }
                other => {
                    tracing::debug!(state = %other, "Skipping reconnection");
                    return Err(ClientError::not_ready(other));
                }
            }
        };

        tracing::warn!("Connection lost, reconnecting");
        let result = self
            .reconnector
            .attempt_reconnection(|| self.resubscribe(generation))
            .await;
        {
            let mut session = self.session();
            if session.reconnecting == Some(generation) {
                session.reconnecting = None;
            }
        }

        match result {
            Ok(()) => {
                metrics::record_reconnection("success");
                tracing::info!("Beacon subscription recovered");
                Ok(())
            }
            Err(e) => {
                if e.is_reconnection() {
                    metrics::record_reconnection("exhausted");
                    self.set_lifecycle_if(generation, LifecycleState::Failed);
                    tracing::error!(error = %e, "Reconnection budget exhausted, client failed");
                } else {
                    metrics::record_reconnection("aborted");
                    self.set_lifecycle_if(generation, LifecycleState::Uninitialized);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockProvider, SubscribeFailure};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn client_with(mock: &MockProvider) -> BeaconClient {
        BeaconClient::new(ClientConfig::new("beacon.test"), Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failing_callbacks() {
        let mock = MockProvider::new();
        let client = client_with(&mock);
        client.initialize().await.unwrap();

        let delivered = Arc::new(AtomicU32::new(0));
        let d = delivered.clone();
        client.request_randomness(|_| Err("boom".into())).await.unwrap();
        client.request_randomness(|_| panic!("callback exploded")).await.unwrap();
        client
            .request_randomness(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        mock.publish_round();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(client.pending_requests(), 3);
    }

    #[tokio::test]
    async fn test_stale_commit_releases_subscription() {
        let mock = MockProvider::new();
        let client = client_with(&mock);

        let id = client.inner.subscribe_once().await.unwrap();
        assert_eq!(mock.active_subscriptions(), 1);

        client.cleanup().await;
        assert!(!client.inner.commit_subscription(id, 0).await);
        assert_eq!(mock.active_subscriptions(), 0);
        assert_eq!(client.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_dispatch_handler() {
        let mock = MockProvider::new();
        let client = client_with(&mock);
        client.initialize().await.unwrap();

        let generation = client.inner.session().generation;
        client.inner.resubscribe(generation).await.unwrap();

        assert_eq!(mock.active_subscriptions(), 1);
        assert_eq!(client.inner.registry.len(), 1);
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_failure_handoff_skipped_when_uninitialized() {
        let client = client_with(&MockProvider::new());
        let err = client.inner.handle_connection_failure(0).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(client.inner.session().reconnecting, None);
    }

    #[tokio::test]
    async fn test_failure_from_previous_session_is_ignored() {
        let mock = MockProvider::new();
        let client = client_with(&mock);
        client.initialize().await.unwrap();
        let old = client.inner.session().generation;

        client.cleanup().await;
        client.initialize().await.unwrap();

        client.inner.handle_connection_failure(old).await.unwrap();
        assert!(client.is_ready());
        assert_eq!(mock.subscribe_calls(), 2);
        assert_eq!(client.inner.session().reconnecting, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_retry_stops_after_cleanup() {
        let mock = MockProvider::new();
        mock.configure(|b| b.subscribe_failure = SubscribeFailure::Always);
        let client = client_with(&mock);

        let inner = client.inner.clone();
        let retry = tokio::spawn(async move { inner.subscribe_with_retry(0).await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        client.cleanup().await;

        let err = retry.await.unwrap().unwrap_err();
        assert!(err.is_connection());
        assert_eq!(mock.subscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_changes_are_published() {
        let client = client_with(&MockProvider::new());
        let states = client.state_changes();
        assert_eq!(*states.borrow(), LifecycleState::Uninitialized);

        client.initialize().await.unwrap();
        assert_eq!(*states.borrow(), LifecycleState::Ready);

        client.cleanup().await;
        assert_eq!(*states.borrow(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_debug_hides_internals() {
        let client = client_with(&MockProvider::new());
        let debug = format!("{:?}", client);
        assert!(debug.contains("beacon.test"));
        assert!(debug.contains("Uninitialized"));
    }
}
