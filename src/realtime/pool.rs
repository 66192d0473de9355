// Partitioned worker pool for the chat flow.
//
// Each channel id hashes onto one worker, and each worker drains its own
// FIFO queue, so messages in a channel are decided in arrival order while
// different channels run in parallel. A full queue is overload: the message
// gets the engine's default decision instead of waiting.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::ModerationResult;
use crate::models::{ChatMessage, RealtimeDecision};
use crate::sink::DecisionSink;

use super::engine::RealtimeEngine;

type Reply = oneshot::Sender<ModerationResult<RealtimeDecision>>;

struct Job {
    message: ChatMessage,
    received_at: Instant,
    reply: Reply,
}

pub struct PartitionedPool {
    senders: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    engine: Arc<RealtimeEngine>,
    sink: Arc<dyn DecisionSink>,
    enqueue_timeout: Duration,
}

impl PartitionedPool {
    /// Spawn `workers` partition workers (at least one).
    pub fn new(workers: usize, engine: Arc<RealtimeEngine>, sink: Arc<dyn DecisionSink>) -> Self {
        let workers = workers.max(1);
        let depth = engine.policy().queue_depth;
        let enqueue_timeout = engine.policy().enqueue_timeout();

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for partition in 0..workers {
            let (tx, rx) = mpsc::channel(depth);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                partition,
                rx,
                Arc::clone(&engine),
                Arc::clone(&sink),
            )));
        }

        Self {
            senders,
            workers: handles,
            engine,
            sink,
            enqueue_timeout,
        }
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Worker index that owns `channel_id`.
    pub fn partition_for(&self, channel_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        channel_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue a message; the receiver resolves once its decision has been
    /// written to the sink.
    pub async fn submit(&self, message: ChatMessage) -> oneshot::Receiver<ModerationResult<RealtimeDecision>> {
        let received_at = Instant::now();
        let (reply, rx) = oneshot::channel();
        let partition = self.partition_for(&message.channel_id);
        let job = Job {
            message,
            received_at,
            reply,
        };

        let rejected = match self.senders[partition].send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => return rx,
            Err(SendTimeoutError::Timeout(job)) => job,
            Err(SendTimeoutError::Closed(job)) => job,
        };

        warn!(
            message_id = %rejected.message.id,
            partition,
            "Chat partition saturated, emitting default decision"
        );
        let decision = self.engine.default_decision(&rejected.message, rejected.received_at);
        let result = hand_off(self.sink.as_ref(), &rejected.message, decision).await;
        let _ = rejected.reply.send(result);
        rx
    }

    /// Close every queue and wait for in-flight messages to drain.
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Chat worker failed");
            }
        }
    }
}

async fn run_worker(
    partition: usize,
    mut rx: mpsc::Receiver<Job>,
    engine: Arc<RealtimeEngine>,
    sink: Arc<dyn DecisionSink>,
) {
    while let Some(job) = rx.recv().await {
        let decision = engine.process(&job.message, job.received_at).await;
        let result = hand_off(sink.as_ref(), &job.message, decision).await;
        if let Err(e) = &result {
            error!(partition, message_id = %job.message.id, error = %e, "Chat decision not handed off");
        }
        // The submitter may have stopped listening.
        let _ = job.reply.send(result);
    }
}

async fn hand_off(
    sink: &dyn DecisionSink,
    message: &ChatMessage,
    decision: RealtimeDecision,
) -> ModerationResult<RealtimeDecision> {
    if decision.flags.queued_for_review {
        sink.write_chat_review(message).await?;
    }
    sink.write_realtime_decision(&decision).await?;
    Ok(decision)
}
