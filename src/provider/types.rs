//! Payloads exchanged with the ledger provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing identifier of the chain the provider is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account the provider signs operations with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub owner: String,
    pub balance: u128,
}

/// Provider-assigned subscription identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event streams the beacon publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    RandomnessPublished,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RandomnessPublished => "RandomnessPublished",
        }
    }
}

/// State-changing operation submitted to the beacon.
///
/// Serializes as `{ "type": "RequestRandomness", "data": { "requestId": .., "timestamp": .. } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    RequestRandomness {
        request_id: String,
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
}

/// Read-only query against beacon state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Query {
    #[serde(rename_all = "camelCase")]
    GetRandomness { round_id: u64 },
}

/// Outcome of `submit_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl TransactionResult {
    pub fn ok(transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            transaction_id: Some(transaction_id.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            transaction_id: None,
        }
    }
}

/// Outcome of `query`. `result` is absent when the round is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub result: Option<RandomnessEvent>,
}

/// Raw `RandomnessPublished` payload as emitted on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessEvent {
    #[serde(rename = "roundId")]
    pub round_id: u64,
    pub random_number: [u8; 32],
    pub nonce: [u8; 16],
    pub attestation: Vec<u8>,
}

/// Errors reported by a provider implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport failed before the ledger saw the call.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The ledger refused the call.
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    /// Provider-side bug or unexpected state.
    #[error("provider internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether the failure is transport-level and worth reconnecting over.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;
