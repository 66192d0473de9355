// Error taxonomy for the moderation core.
//
// Adapter errors never abort an item: tiers convert them into degraded
// ScoreSets. Sink errors are the only failures that reach the ingress
// acknowledgment layer, which relies on redelivery instead of local retries.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single scoring adapter call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("adapter {adapter} exceeded its {budget:?} budget")]
    Timeout { adapter: String, budget: Duration },

    #[error("adapter {adapter} unavailable: {reason}")]
    Unavailable { adapter: String, reason: String },
}

impl AdapterError {
    pub fn adapter(&self) -> &str {
        match self {
            AdapterError::Timeout { adapter, .. } => adapter,
            AdapterError::Unavailable { adapter, .. } => adapter,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout { .. })
    }
}

/// Failure of the storage collaborator.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("storage sink unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the orchestrator, stores and real-time engine.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    AdapterTimeout(AdapterError),

    #[error(transparent)]
    AdapterUnavailable(AdapterError),

    /// Per-key serialization should make this impossible; persistent
    /// contention means the store is misconfigured.
    #[error("state store contention on key {key} after {attempts} attempts")]
    StateStoreContention { key: String, attempts: u32 },

    #[error("concurrency limit reached, waited {waited:?}")]
    OverloadBackpressure { waited: Duration },

    #[error("decision hand-off failed: {0}")]
    SinkWriteFailure(#[from] SinkError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("adapter {0} is not rated for the real-time latency budget")]
    IneligibleAdapter(String),

    #[error("unknown review task {0}")]
    UnknownReviewTask(uuid::Uuid),
}

impl From<AdapterError> for ModerationError {
    fn from(err: AdapterError) -> Self {
        if err.is_timeout() {
            ModerationError::AdapterTimeout(err)
        } else {
            ModerationError::AdapterUnavailable(err)
        }
    }
}

pub type ModerationResult<T> = std::result::Result<T, ModerationError>;
