// DecisionSink trait — backend-agnostic hand-off to durable storage.
//
// Implementors: MemorySink (DashMaps, used by tests and simulations) and
// SqliteSink (rusqlite, behind the `sqlite` feature). Every write is an
// upsert keyed by the entity's id, so redelivered items and sink-side
// retries never create duplicates.

use async_trait::async_trait;

use crate::error::SinkError;
use crate::models::{ChatMessage, Decision, RealtimeDecision, ReputationRecord, ReviewTask};

#[async_trait]
pub trait DecisionSink: Send + Sync {
    /// Upsert a content decision keyed by content id.
    async fn write_decision(&self, decision: &Decision) -> Result<(), SinkError>;

    /// Upsert a chat decision keyed by message id.
    async fn write_realtime_decision(&self, decision: &RealtimeDecision) -> Result<(), SinkError>;

    /// Upsert a review task keyed by task id.
    async fn write_review_task(&self, task: &ReviewTask) -> Result<(), SinkError>;

    /// Upsert a reputation record keyed by user id.
    async fn write_reputation(&self, record: &ReputationRecord) -> Result<(), SinkError>;

    /// Queue a chat message for asynchronous human review.
    async fn write_chat_review(&self, message: &ChatMessage) -> Result<(), SinkError>;
}
