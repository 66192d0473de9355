use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::SinkError;
use crate::models::{ChatMessage, Decision, RealtimeDecision, ReputationRecord, ReviewTask};

use super::traits::DecisionSink;

/// In-process sink. Keeps the latest version of every entity.
#[derive(Default)]
pub struct MemorySink {
    decisions: DashMap<String, Decision>,
    realtime: DashMap<String, RealtimeDecision>,
    tasks: DashMap<Uuid, ReviewTask>,
    reputations: DashMap<String, ReputationRecord>,
    chat_reviews: DashMap<String, ChatMessage>,
    decision_writes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision(&self, content_id: &str) -> Option<Decision> {
        self.decisions.get(content_id).map(|d| d.clone())
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions.iter().map(|d| d.clone()).collect()
    }

    pub fn realtime_decision(&self, message_id: &str) -> Option<RealtimeDecision> {
        self.realtime.get(message_id).map(|d| d.clone())
    }

    pub fn realtime_decisions(&self) -> Vec<RealtimeDecision> {
        self.realtime.iter().map(|d| d.clone()).collect()
    }

    pub fn review_task(&self, id: Uuid) -> Option<ReviewTask> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn review_tasks(&self) -> Vec<ReviewTask> {
        self.tasks.iter().map(|t| t.clone()).collect()
    }

    pub fn reputation(&self, user_id: &str) -> Option<ReputationRecord> {
        self.reputations.get(user_id).map(|r| r.clone())
    }

    pub fn chat_reviews(&self) -> Vec<ChatMessage> {
        self.chat_reviews.iter().map(|m| m.clone()).collect()
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    /// Number of write_decision calls, including idempotent repeats.
    pub fn decision_writes(&self) -> usize {
        self.decision_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DecisionSink for MemorySink {
    async fn write_decision(&self, decision: &Decision) -> Result<(), SinkError> {
        self.decision_writes.fetch_add(1, Ordering::Relaxed);
        self.decisions.insert(decision.content_id.clone(), decision.clone());
        Ok(())
    }

    async fn write_realtime_decision(&self, decision: &RealtimeDecision) -> Result<(), SinkError> {
        self.realtime.insert(decision.message_id.clone(), decision.clone());
        Ok(())
    }

    async fn write_review_task(&self, task: &ReviewTask) -> Result<(), SinkError> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn write_reputation(&self, record: &ReputationRecord) -> Result<(), SinkError> {
        self.reputations.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn write_chat_review(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.chat_reviews.insert(message.id.clone(), message.clone());
        Ok(())
    }
}
