//! Client-side types and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::provider::types::{
    Operation, ProviderError, Query, RandomnessEvent, SubscriptionId, TransactionResult,
};

/// Prefix every generated request ID starts with.
pub const REQUEST_ID_PREFIX: &str = "req_";

/// Length of the random tail appended to generated IDs.
const ID_SUFFIX_LEN: usize = 9;

/// Last timestamp handed out, so IDs from one process are strictly increasing.
static LAST_REQUEST_MICROS: AtomicU64 = AtomicU64::new(0);

/// Lowercase alphanumeric suffix for generated identifiers.
pub(crate) fn random_suffix() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn monotonic_micros() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    let mut last = LAST_REQUEST_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_REQUEST_MICROS.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Identifier of a randomness request: `req_<epoch-micros>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh, collision-resistant request ID.
    pub fn generate() -> Self {
        Self(format!(
            "{}{}_{}",
            REQUEST_ID_PREFIX,
            monotonic_micros(),
            random_suffix()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Published randomness as handed to callbacks, with byte fields hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomnessResult {
    pub round_id: u64,
    /// `0x`-prefixed hex of the 32-byte value.
    pub random_number: String,
    /// `0x`-prefixed hex of the 16-byte nonce.
    pub nonce: String,
    pub attestation: String,
}

fn prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

impl From<&RandomnessEvent> for RandomnessResult {
    fn from(event: &RandomnessEvent) -> Self {
        Self {
            round_id: event.round_id,
            random_number: prefixed_hex(&event.random_number),
            nonce: prefixed_hex(&event.nonce),
            attestation: prefixed_hex(&event.attestation),
        }
    }
}

/// Failure reported by a user callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result user callbacks return.
pub type CallbackResult = Result<(), CallbackError>;

/// Callback invoked with every published round while registered.
pub type RandomnessCallback = Arc<dyn Fn(&RandomnessResult) -> CallbackResult + Send + Sync>;

/// Lifecycle of a [`crate::BeaconClient`].
///
/// ```text
/// Uninitialized → Initializing → Ready ⇄ Reconnecting → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Reconnecting,
    /// Reconnection budget exhausted. Terminal.
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Reconnecting => "reconnecting",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The provider call a [`ClientError::Request`] originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BeaconRequest {
    Operation(Operation),
    Query(Query),
}

impl BeaconRequest {
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            BeaconRequest::Operation(op) => Some(op),
            BeaconRequest::Query(_) => None,
        }
    }

    pub fn query(&self) -> Option<&Query> {
        match self {
            BeaconRequest::Query(q) => Some(q),
            BeaconRequest::Operation(_) => None,
        }
    }
}

fn describe_cause(cause: &Option<ProviderError>) -> String {
    match cause {
        Some(cause) => cause.to_string(),
        None => "unknown cause".to_string(),
    }
}

fn describe_subscription(id: &Option<SubscriptionId>) -> String {
    match id {
        Some(id) => format!(" ({})", id),
        None => String::new(),
    }
}

/// Category of a [`ClientError`], for catch-site branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    Connection,
    Reconnection,
    Subscription,
    Request,
}

/// Errors surfaced by the beacon client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Transport-level failure.
    #[error("network error: {}", describe_cause(.cause))]
    Network { cause: Option<ProviderError> },

    /// Deadline exceeded before the provider answered.
    #[error("operation timed out after {} ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Operation attempted while the client is not ready.
    #[error("client not connected: {reason}")]
    Connection { reason: String },

    /// Reconnection attempt budget exhausted.
    #[error("reconnection failed after {attempts} attempts")]
    Reconnection { attempts: u32 },

    /// Subscribing or unsubscribing failed.
    #[error("subscription error{}: {message}", describe_subscription(.subscription_id))]
    Subscription {
        subscription_id: Option<SubscriptionId>,
        message: String,
    },

    /// The provider reported an application-level failure.
    #[error("request rejected by beacon: {reason}")]
    Request {
        request: Box<BeaconRequest>,
        response: Option<TransactionResult>,
        reason: String,
    },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Network { .. } => ErrorKind::Network,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Connection { .. } => ErrorKind::Connection,
            ClientError::Reconnection { .. } => ErrorKind::Reconnection,
            ClientError::Subscription { .. } => ErrorKind::Subscription,
            ClientError::Request { .. } => ErrorKind::Request,
        }
    }

    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub fn is_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    pub fn is_reconnection(&self) -> bool {
        self.kind() == ErrorKind::Reconnection
    }

    pub fn is_subscription(&self) -> bool {
        self.kind() == ErrorKind::Subscription
    }

    pub fn is_request(&self) -> bool {
        self.kind() == ErrorKind::Request
    }

    /// Network and timeout failures start a background reconnection.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout)
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Reconnection => "reconnection",
            ErrorKind::Subscription => "subscription",
            ErrorKind::Request => "request",
        }
    }

    pub(crate) fn not_ready(state: LifecycleState) -> Self {
        ClientError::Connection {
            reason: format!("client is {}, expected ready", state),
        }
    }

    /// Classify a provider failure from a submit or query call.
    pub(crate) fn from_provider(err: ProviderError, request: BeaconRequest) -> Self {
        if err.is_transport() {
            ClientError::Network { cause: Some(err) }
        } else {
            ClientError::Request {
                request: Box::new(request),
                response: None,
                reason: err.to_string(),
            }
        }
    }

    /// Classify a provider failure from a subscribe call.
    pub(crate) fn from_subscribe(err: ProviderError) -> Self {
        if err.is_transport() {
            ClientError::Network { cause: Some(err) }
        } else {
            ClientError::Subscription {
                subscription_id: None,
                message: err.to_string(),
            }
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_ids_are_unique_and_prefixed() {
        let ids: Vec<RequestId> = (0..1000).map(|_| RequestId::generate()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        for id in &ids {
            assert!(id.as_str().starts_with(REQUEST_ID_PREFIX));
            let suffix = id.as_str().rsplit('_').next().unwrap();
            assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        }
    }

    #[test]
    fn test_request_id_timestamps_increase() {
        let stamp = |id: &RequestId| -> u64 {
            id.as_str()
                .trim_start_matches(REQUEST_ID_PREFIX)
                .split('_')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        };
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert!(stamp(&b) > stamp(&a));
    }

    #[test]
    fn test_result_hex_encoding() {
        let event = RandomnessEvent {
            round_id: 42,
            random_number: [0xab; 32],
            nonce: [0x01; 16],
            attestation: vec![0xde, 0xad],
        };
        let result = RandomnessResult::from(&event);
        assert_eq!(result.round_id, 42);
        assert_eq!(result.random_number, format!("0x{}", "ab".repeat(32)));
        assert_eq!(result.nonce, format!("0x{}", "01".repeat(16)));
        assert_eq!(result.attestation, "0xdead");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["roundId"], 42);
        assert!(json.get("randomNumber").is_some());
    }

    #[test]
    fn test_empty_attestation_encodes_as_bare_prefix() {
        let event = RandomnessEvent {
            round_id: 1,
            random_number: [0; 32],
            nonce: [0; 16],
            attestation: Vec::new(),
        };
        assert_eq!(RandomnessResult::from(&event).attestation, "0x");
    }

    #[test]
    fn test_error_kinds() {
        let timeout = ClientError::Timeout {
            after: Duration::from_millis(100),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.triggers_reconnect());
        assert_eq!(timeout.to_string(), "operation timed out after 100 ms");

        let exhausted = ClientError::Reconnection { attempts: 3 };
        assert_eq!(exhausted.kind(), ErrorKind::Reconnection);
        assert!(!exhausted.triggers_reconnect());
        assert!(exhausted.to_string().contains('3'));

        let not_ready = ClientError::not_ready(LifecycleState::Uninitialized);
        assert!(not_ready.is_connection());
        assert!(not_ready.to_string().contains("uninitialized"));
    }

    #[test]
    fn test_provider_error_classification() {
        let request = BeaconRequest::Query(Query::GetRandomness { round_id: 1 });
        let network = ClientError::from_provider(ProviderError::Transport("reset".into()), request.clone());
        assert!(network.is_network());
        assert!(network.to_string().contains("reset"));

        let rejected = ClientError::from_provider(ProviderError::Rejected("bad round".into()), request);
        match rejected {
            ClientError::Request { request, .. } => {
                assert_eq!(request.query(), Some(&Query::GetRandomness { round_id: 1 }));
                assert!(request.operation().is_none());
            }
            other => panic!("expected request error, got {other:?}"),
        }

        assert!(ClientError::from_subscribe(ProviderError::Internal("boom".into())).is_subscription());
        assert!(ClientError::from_subscribe(ProviderError::Transport("down".into())).is_network());
    }
}
