//! Local registry of event handlers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::client::types::{epoch_millis, random_suffix, CallbackResult};
use crate::observability::metrics;
use crate::provider::types::EventType;

/// Identifier of a registry entry: `sub_<epoch-millis>_<suffix>`.
///
/// Uniqueness is best-effort; timestamp plus random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(String);

impl RegistrationId {
    fn generate() -> Self {
        Self(format!("sub_{}_{}", epoch_millis(), random_suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handler stored in the registry.
pub type Handler<E> = Arc<dyn Fn(&E) -> CallbackResult + Send + Sync>;

struct Registration<E> {
    event_type: EventType,
    handler: Handler<E>,
}

/// Run a user-supplied handler, turning both `Err` returns and panics into a message.
pub(crate) fn run_isolated(f: impl FnOnce() -> CallbackResult) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(format!("panic: {}", message))
        }
    }
}

/// Tracks event handlers and fans events out to them.
///
/// A failing handler is logged and skipped; it never stops delivery to the
/// others and never leaves the registry in a partial state.
pub struct SubscriptionRegistry<E> {
    entries: DashMap<RegistrationId, Registration<E>>,
}

impl<E> SubscriptionRegistry<E> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register `handler` for `event_type`.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> RegistrationId
    where
        F: Fn(&E) -> CallbackResult + Send + Sync + 'static,
    {
        let id = RegistrationId::generate();
        self.entries.insert(
            id.clone(),
            Registration {
                event_type,
                handler: Arc::new(handler),
            },
        );
        tracing::debug!(registration = %id, event_type = event_type.as_str(), "Handler registered");
        id
    }

    /// Remove a handler. Returns false if `id` is unknown.
    pub fn unsubscribe(&self, id: &RegistrationId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if !removed {
            tracing::debug!(registration = %id, "Unsubscribe for unknown registration");
        }
        removed
    }

    /// Deliver `event` to every handler registered for `event_type`.
    ///
    /// Returns the number of handlers that completed without error.
    pub fn emit(&self, event_type: EventType, event: &E) -> usize {
        // Snapshot first: handlers may subscribe or unsubscribe re-entrantly.
        let handlers: Vec<(RegistrationId, Handler<E>)> = self
            .entries
            .iter()
            .filter(|entry| entry.value().event_type == event_type)
            .map(|entry| (entry.key().clone(), entry.value().handler.clone()))
            .collect();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match run_isolated(|| handler(event)) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    metrics::record_callback_failure();
                    tracing::error!(
                        registration = %id,
                        event_type = event_type.as_str(),
                        error = %reason,
                        "Event handler failed"
                    );
                }
            }
        }
        delivered
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handlers currently registered for `event_type`.
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().event_type == event_type)
            .count()
    }
}

impl<E> Default for SubscriptionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for SubscriptionRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("registrations", &self.entries.len())
            .finish()
    }
}
