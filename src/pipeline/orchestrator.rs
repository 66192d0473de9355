// Moderation orchestrator for the content flow.
//
// Drives each ContentItem through the PipelineState machine, enforces the
// item-level deadline, applies the reputation update once per terminal
// decision and hands the result to the sink. Sink failures are returned to
// the caller (the ingress layer nacks and relies on redelivery); everything
// upstream of the sink degrades instead of failing.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::PolicyConfig;
use crate::error::{ModerationError, ModerationResult, SinkError};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::models::{
    ContentItem, Decision, DecisionKind, EscalationReason, ProcessingTier, ReviewAction, ReviewOutcome, ReviewTask,
    ReviewVerdict, ScoreSet, Severity,
};
use crate::reputation::{ReputationPolicy, ReputationStore};
use crate::scoring::{Assessment, ScoringAdapter};
use crate::sink::{DecisionSink, MemorySink};
use crate::tiers::{
    EscalationPolicy, EscalationTier, HardSignal, MlPolicy, MlTier, MlVerdict, ReviewQueue, TriageOutcome,
    TriagePolicy, TriageTier,
};

use super::ingress::Delivery;
use super::ledger::{DecisionLedger, LedgerEntry};
use super::state::PipelineState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorPolicy {
    /// Ceiling on total machine processing time per item
    pub item_deadline_ms: u64,
    /// How long a submission may wait for a concurrency slot
    pub enqueue_timeout_ms: u64,
    /// Items processed at once
    pub concurrency: usize,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            item_deadline_ms: 2_000,
            enqueue_timeout_ms: 250,
            concurrency: 64,
        }
    }
}

impl OrchestratorPolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        if self.item_deadline_ms == 0 || self.enqueue_timeout_ms == 0 || self.concurrency == 0 {
            return Err(ModerationError::InvalidConfig(
                "orchestrator deadline, enqueue timeout and concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn item_deadline(&self) -> Duration {
        Duration::from_millis(self.item_deadline_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

/// Acks and nacks sent back by one `consume` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngressStats {
    pub acked: usize,
    pub nacked: usize,
}

/// Per-item working state threaded through `step`.
struct ItemContext<'a> {
    item: &'a ContentItem,
    started: Instant,
    deadline: Instant,
    path: Vec<String>,
    notes: Vec<String>,
    task: Option<ReviewTask>,
}

impl<'a> ItemContext<'a> {
    fn new(item: &'a ContentItem, budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            item,
            started,
            deadline: started + budget,
            path: Vec::new(),
            notes: Vec::new(),
            task: None,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

pub struct Orchestrator {
    triage: TriageTier,
    ml: MlTier,
    escalation: EscalationTier,
    reputation: Arc<ReputationStore>,
    sink: Arc<dyn DecisionSink>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    ledger: DecisionLedger,
    permits: Arc<Semaphore>,
    policy: OrchestratorPolicy,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn policy(&self) -> &OrchestratorPolicy {
        &self.policy
    }

    pub fn review_queue(&self) -> &Arc<ReviewQueue> {
        self.escalation.queue()
    }

    pub fn reputation(&self) -> &Arc<ReputationStore> {
        &self.reputation
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    /// Decide one item without waiting for a concurrency slot.
    ///
    /// A content id that already has a Decision gets the stored Decision
    /// re-emitted to the sink: no tier runs and reputation is untouched.
    pub async fn process(&self, item: &ContentItem) -> ModerationResult<Decision> {
        if let Some(entry) = self.ledger.get(&item.id) {
            debug!(content_id = %item.id, "Redelivered item, re-emitting stored decision");
            self.emit(&entry).await?;
            return Ok(entry.decision);
        }

        let (decision, task) = self.run_machine(item).await;
        self.finalize(item, LedgerEntry { decision, task }).await
    }

    /// Decide one item under the concurrency limit. An item that can't get a
    /// slot within the enqueue timeout goes straight to human review.
    pub async fn submit(&self, item: &ContentItem) -> ModerationResult<Decision> {
        let waited = self.policy.enqueue_timeout();
        let permit = timeout(waited, self.permits.acquire()).await;
        match permit {
            Ok(Ok(_permit)) => self.process(item).await,
            _ => {
                self.fast_track(item, ModerationError::OverloadBackpressure { waited })
                    .await
            }
        }
    }

    /// Submit many items at once. Results arrive in completion order.
    pub async fn process_batch(&self, items: &[ContentItem]) -> Vec<ModerationResult<Decision>> {
        stream::iter(items.iter().map(|item| self.submit(item)))
            .buffer_unordered(self.policy.concurrency)
            .collect()
            .await
    }

    /// Ingress loop: process each delivery, ack once its Decision is in the
    /// sink, nack otherwise. Runs until the sender side closes.
    ///
    /// A delivery that can't get a slot within the enqueue timeout is
    /// fast-tracked to human review, same as `submit`.
    pub async fn consume(self: Arc<Self>, mut rx: mpsc::Receiver<Delivery<ContentItem>>) -> IngressStats {
        let mut stats = IngressStats::default();
        let mut tasks = JoinSet::new();
        let waited = self.policy.enqueue_timeout();

        while let Some(delivery) = rx.recv().await {
            // Wait for a slot before pulling the next delivery so a saturated
            // pipeline slows reads from the source.
            let permit = match timeout(waited, Arc::clone(&self.permits).acquire_owned()).await {
                Ok(Ok(permit)) => Some(permit),
                Ok(Err(_)) => {
                    delivery.nack("orchestrator shutting down");
                    stats.nacked += 1;
                    continue;
                }
                Err(_) => None,
            };

            let orchestrator = Arc::clone(&self);
            tasks.spawn(async move {
                let result = match permit {
                    Some(_permit) => orchestrator.process(&delivery.payload).await,
                    None => {
                        orchestrator
                            .fast_track(&delivery.payload, ModerationError::OverloadBackpressure { waited })
                            .await
                    }
                };
                match result {
                    Ok(_) => {
                        delivery.ack();
                        true
                    }
                    Err(e) => {
                        warn!(
                            content_id = %delivery.payload.id,
                            attempt = delivery.attempt,
                            error = %e,
                            "Decision not handed off, requesting redelivery"
                        );
                        delivery.nack(e.to_string());
                        false
                    }
                }
            });

            while let Some(done) = tasks.try_join_next() {
                tally(&mut stats, done);
            }
        }

        while let Some(done) = tasks.join_next().await {
            tally(&mut stats, done);
        }
        stats
    }

    /// Fold a human reviewer's verdict into a final Decision.
    ///
    /// Reputation moves only on the call that completes the task. A repeated
    /// outcome re-emits the stored result, or rebuilds it without touching
    /// reputation if the ledger has already forgotten the item.
    pub async fn ingest_review_outcome(&self, task_id: Uuid, outcome: ReviewOutcome) -> ModerationResult<Decision> {
        let queue = self.escalation.queue();
        let open = queue.get(task_id).ok_or(ModerationError::UnknownReviewTask(task_id))?;
        let (task, newly_completed) = queue.complete(task_id, outcome.reviewer.clone(), self.clock.now())?;

        let previous = self.ledger.get(&task.content_id);
        if !newly_completed {
            if let Some(entry) = previous.as_ref().filter(|e| e.decision.tier == ProcessingTier::HumanReview) {
                debug!(task_id = %task_id, "Review outcome already ingested");
                self.emit(entry).await?;
                return Ok(entry.decision.clone());
            }
        }

        let decision = review_decision(&task, &outcome, previous.as_ref(), self.clock.now());
        if newly_completed {
            if let Err(e) = self.reputation.apply_outcome(&decision.author_id, &decision) {
                // Reopen so a retry applies the outcome in full
                queue.insert(open);
                return Err(e);
            }
            self.record_metrics(&decision);
            info!(
                task_id = %task_id,
                content_id = %decision.content_id,
                kind = %decision.kind,
                severity = %decision.severity,
                "Review outcome ingested"
            );
        } else {
            debug!(task_id = %task_id, "Rebuilding evicted review decision without reputation change");
        }

        let entry = LedgerEntry {
            decision,
            task: Some(task),
        };
        self.ledger.replace(entry.clone());
        self.emit(&entry).await?;
        Ok(entry.decision)
    }

    /// Report open review tasks past their SLA deadline.
    pub fn sweep_sla(&self, now: DateTime<Utc>) -> Vec<ReviewTask> {
        let breached = self.escalation.queue().breached(now);
        for task in &breached {
            warn!(
                task_id = %task.id,
                content_id = %task.content_id,
                priority = %task.priority,
                overdue_minutes = (now - task.sla_deadline).num_minutes(),
                "Review task past SLA"
            );
            self.metrics
                .incr("review.sla_breached", &[("priority", task.priority.as_str())], 1);
        }
        info!(breached = breached.len(), "SLA sweep complete");
        breached
    }

    /// Forget decisions made before `older_than` along with idle triage
    /// counters. Items redelivered after eviction are decided afresh.
    pub fn evict_ledger(&self, older_than: DateTime<Utc>) -> usize {
        let evicted = self.ledger.evict(older_than);
        let counters = self.triage.evict_idle(older_than);
        debug!(evicted, counters, "Ledger eviction");
        evicted
    }

    async fn run_machine(&self, item: &ContentItem) -> (Decision, Option<ReviewTask>) {
        let mut ctx = ItemContext::new(item, self.policy.item_deadline());
        let mut state = PipelineState::Received;
        loop {
            state = match self.step(state, &mut ctx).await {
                PipelineState::Terminal(decision) => return (decision, ctx.task.take()),
                next => next,
            };
        }
    }

    /// One transition of the state machine.
    async fn step(&self, state: PipelineState, ctx: &mut ItemContext<'_>) -> PipelineState {
        if state.is_terminal() {
            return state;
        }
        let state = if ctx.expired() {
            self.on_deadline(state, ctx)
        } else {
            state
        };
        ctx.path.push(state.label().to_string());

        match state {
            PipelineState::Received => PipelineState::Triage,

            PipelineState::Triage => match self.triage.evaluate(ctx.item) {
                TriageOutcome::Reject(signal) => PipelineState::Terminal(self.hard_reject(ctx, signal)),
                TriageOutcome::FastApprove { reputation } => {
                    PipelineState::Terminal(self.fast_approve(ctx, reputation))
                }
                TriageOutcome::Pass { partial, signals } => {
                    ctx.notes.extend(signals);
                    PipelineState::MlScoring { partial }
                }
            },

            PipelineState::MlScoring { partial } => {
                let scored = timeout(ctx.remaining(), self.ml.score(ctx.item, &partial)).await;
                let Ok(outcome) = scored else {
                    let assessment = self.assess_partial(partial);
                    return self.deadline_escalation(ctx, assessment);
                };
                for adapter in &outcome.degraded {
                    ctx.notes.push(format!("degraded_adapter({adapter})"));
                }
                match outcome.verdict {
                    MlVerdict::Approve => PipelineState::Terminal(self.decision(
                        ctx,
                        DecisionKind::Approved,
                        ProcessingTier::MachineLearning,
                        &outcome.assessment,
                    )),
                    MlVerdict::Reject => PipelineState::Terminal(self.decision(
                        ctx,
                        DecisionKind::Rejected,
                        ProcessingTier::MachineLearning,
                        &outcome.assessment,
                    )),
                    MlVerdict::Escalate(reason) => PipelineState::Escalation {
                        assessment: outcome.assessment,
                        reason,
                    },
                }
            }

            PipelineState::Escalation { assessment, reason } => {
                PipelineState::Terminal(self.escalate(ctx, &assessment, reason))
            }

            PipelineState::Terminal(decision) => PipelineState::Terminal(decision),
        }
    }

    fn escalate(&self, ctx: &mut ItemContext<'_>, assessment: &Assessment, reason: EscalationReason) -> Decision {
        let task = self
            .escalation
            .create_task(ctx.item, assessment, reason, self.clock.now());
        let mut decision = self.decision(ctx, DecisionKind::Escalated, ProcessingTier::Escalation, assessment);
        decision.review_task_id = Some(task.id);
        decision.escalation_reason = Some(reason);
        ctx.task = Some(task);
        decision
    }

    fn on_deadline(&self, state: PipelineState, ctx: &mut ItemContext<'_>) -> PipelineState {
        match state {
            PipelineState::Received | PipelineState::Triage => self.deadline_escalation(ctx, Assessment::unscored()),
            PipelineState::MlScoring { partial } => {
                let assessment = self.assess_partial(partial);
                self.deadline_escalation(ctx, assessment)
            }
            other => other,
        }
    }

    fn deadline_escalation(&self, ctx: &mut ItemContext<'_>, assessment: Assessment) -> PipelineState {
        warn!(
            content_id = %ctx.item.id,
            elapsed_ms = ctx.started.elapsed().as_millis() as u64,
            "Item deadline exceeded, forcing escalation"
        );
        self.metrics.incr("pipeline.deadline_exceeded", &[], 1);
        ctx.notes.push("deadline_exceeded".to_string());
        PipelineState::Escalation {
            assessment,
            reason: EscalationReason::DeadlineExceeded,
        }
    }

    fn assess_partial(&self, partial: ScoreSet) -> Assessment {
        self.ml
            .risk_model()
            .assess(partial, &self.ml.policy().violations)
    }

    fn hard_reject(&self, ctx: &mut ItemContext<'_>, signal: HardSignal) -> Decision {
        ctx.notes
            .push(format!("hard_block:{}({})", signal.kind.as_str(), signal.detail));
        let assessment = Assessment {
            combined_risk: 1.0,
            confidence: 1.0,
            violations: BTreeSet::from([signal.dimension.clone()]),
            severity: signal.severity,
            scores: ScoreSet::new("triage").with_score(signal.dimension, 1.0),
        };
        self.decision(ctx, DecisionKind::Rejected, ProcessingTier::Triage, &assessment)
    }

    fn fast_approve(&self, ctx: &mut ItemContext<'_>, reputation: f64) -> Decision {
        ctx.path.push("fast_approve".to_string());
        ctx.notes
            .push(format!("fast_approve(trusted author, reputation {reputation:.1})"));
        self.metrics.incr("pipeline.fast_approved", &[], 1);
        let assessment = Assessment {
            combined_risk: 0.0,
            confidence: 1.0,
            violations: BTreeSet::new(),
            severity: Severity::None,
            scores: ScoreSet::new("triage"),
        };
        self.decision(ctx, DecisionKind::Approved, ProcessingTier::Triage, &assessment)
    }

    fn decision(
        &self,
        ctx: &ItemContext<'_>,
        kind: DecisionKind,
        tier: ProcessingTier,
        assessment: &Assessment,
    ) -> Decision {
        Decision {
            content_id: ctx.item.id.clone(),
            author_id: ctx.item.author_id.clone(),
            kind,
            violations: assessment.violations.clone(),
            severity: assessment.severity,
            combined_risk: assessment.combined_risk,
            confidence: assessment.confidence,
            tier,
            processing_time: ctx.started.elapsed(),
            decided_at: self.clock.now(),
            review_task_id: None,
            escalation_reason: None,
            routing_path: ctx.path.clone(),
            notes: ctx.notes.clone(),
        }
    }

    async fn fast_track(&self, item: &ContentItem, cause: ModerationError) -> ModerationResult<Decision> {
        if let Some(entry) = self.ledger.get(&item.id) {
            self.emit(&entry).await?;
            return Ok(entry.decision);
        }

        warn!(content_id = %item.id, error = %cause, "Fast-tracking item to human review");
        self.metrics.incr("pipeline.fast_tracked", &[], 1);

        let mut ctx = ItemContext::new(item, self.policy.item_deadline());
        ctx.path.extend(["received", "fast_track", "escalation"].map(String::from));
        ctx.notes.push(cause.to_string());

        let decision = self.escalate(&mut ctx, &Assessment::unscored(), EscalationReason::Overload);
        let task = ctx.task.take();
        self.finalize(item, LedgerEntry { decision, task }).await
    }

    async fn finalize(&self, item: &ContentItem, entry: LedgerEntry) -> ModerationResult<Decision> {
        if let Err(existing) = self.ledger.insert_new(entry.clone()) {
            debug!(content_id = %item.id, "Concurrent delivery already decided this item");
            self.emit(&existing).await?;
            return Ok(existing.decision);
        }

        if let Err(e) = self.reputation.apply_outcome(&item.author_id, &entry.decision) {
            self.ledger.remove(&item.id);
            return Err(e);
        }
        self.record_metrics(&entry.decision);

        let d = &entry.decision;
        info!(
            content_id = %d.content_id,
            author = %d.author_id,
            kind = %d.kind,
            tier = d.tier.number(),
            risk = d.combined_risk,
            confidence = d.confidence,
            ms = d.processing_time.as_millis() as u64,
            "Decision finalized"
        );

        self.emit(&entry).await?;
        Ok(entry.decision)
    }

    /// Hand a ledger entry to the sink: review task, then decision, then the
    /// author's current reputation. Every write is an upsert.
    async fn emit(&self, entry: &LedgerEntry) -> ModerationResult<()> {
        let written = async {
            if let Some(task) = &entry.task {
                let current = self.escalation.queue().get(task.id);
                self.sink
                    .write_review_task(current.as_ref().unwrap_or(task))
                    .await?;
            }
            self.sink.write_decision(&entry.decision).await?;
            if let Some(record) = self.reputation.peek(&entry.decision.author_id) {
                self.sink.write_reputation(&record).await?;
            }
            Ok::<(), SinkError>(())
        }
        .await;

        written.map_err(|e| {
            error!(content_id = %entry.decision.content_id, error = %e, "Sink hand-off failed");
            ModerationError::from(e)
        })
    }

    fn record_metrics(&self, decision: &Decision) {
        self.metrics.incr(
            "content.processed",
            &[("tier", decision.tier.as_str()), ("kind", decision.kind.as_str())],
            1,
        );
        for dimension in &decision.violations {
            self.metrics
                .incr("content.violation", &[("dimension", dimension.as_str())], 1);
        }
        self.metrics
            .observe("content.latency", &[("flow", "content")], decision.processing_time);
    }
}

/// Human-review Decision for a completed task. Timestamps come from the
/// task's completion so a rebuilt decision matches the original.
fn review_decision(
    task: &ReviewTask,
    outcome: &ReviewOutcome,
    previous: Option<&LedgerEntry>,
    now: DateTime<Utc>,
) -> Decision {
    let decided_at = task.completed_at().unwrap_or(now);
    let rejected = outcome.verdict == ReviewVerdict::Reject;
    let severity = match (outcome.verdict, outcome.action) {
        (ReviewVerdict::Approve, _) => Severity::None,
        (ReviewVerdict::Reject, ReviewAction::Ban) => Severity::Critical,
        (ReviewVerdict::Reject, _) if outcome.severity == Severity::None => Severity::Medium,
        (ReviewVerdict::Reject, _) => outcome.severity,
    };
    let violations = match (rejected, outcome.violations.is_empty()) {
        (false, _) => BTreeSet::new(),
        (true, true) => task.violations.clone(),
        (true, false) => outcome.violations.clone(),
    };

    let mut routing_path = previous
        .map(|e| e.decision.routing_path.clone())
        .unwrap_or_default();
    routing_path.push("human_review".to_string());

    let mut notes = previous.map(|e| e.decision.notes.clone()).unwrap_or_default();
    if let Some(text) = &outcome.notes {
        notes.push(format!("reviewer: {text}"));
    }
    if outcome.action != ReviewAction::None {
        notes.push(format!("action: {}", outcome.action.as_str()));
    }

    let machine_time = previous.map_or(Duration::ZERO, |e| e.decision.processing_time);
    let review_time = (decided_at - task.created_at).to_std().unwrap_or_default();

    Decision {
        content_id: task.content_id.clone(),
        author_id: task.author_id.clone(),
        kind: if rejected {
            DecisionKind::Rejected
        } else {
            DecisionKind::Approved
        },
        violations,
        severity,
        combined_risk: task.combined_risk,
        confidence: 1.0,
        tier: ProcessingTier::HumanReview,
        processing_time: machine_time + review_time,
        decided_at,
        review_task_id: Some(task.id),
        escalation_reason: Some(task.reason),
        routing_path,
        notes,
    }
}

fn tally(stats: &mut IngressStats, done: Result<bool, tokio::task::JoinError>) {
    match done {
        Ok(true) => stats.acked += 1,
        Ok(false) => stats.nacked += 1,
        Err(e) => {
            error!(error = %e, "Ingress worker failed");
            stats.nacked += 1;
        }
    }
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    triage: TriagePolicy,
    ml: MlPolicy,
    escalation: EscalationPolicy,
    reputation_policy: ReputationPolicy,
    policy: OrchestratorPolicy,
    adapters: Vec<Arc<dyn ScoringAdapter>>,
    sink: Option<Arc<dyn DecisionSink>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    clock: Option<Arc<dyn Clock>>,
    reputation: Option<Arc<ReputationStore>>,
}

impl OrchestratorBuilder {
    /// Take every content-flow policy from a loaded policy bundle.
    pub fn policies(mut self, policies: &PolicyConfig) -> Self {
        self.triage = policies.triage.clone();
        self.ml = policies.ml.clone();
        self.escalation = policies.escalation.clone();
        self.reputation_policy = policies.reputation.clone();
        self.policy = policies.orchestrator.clone();
        self
    }

    pub fn triage_policy(mut self, policy: TriagePolicy) -> Self {
        self.triage = policy;
        self
    }

    pub fn ml_policy(mut self, policy: MlPolicy) -> Self {
        self.ml = policy;
        self
    }

    pub fn escalation_policy(mut self, policy: EscalationPolicy) -> Self {
        self.escalation = policy;
        self
    }

    pub fn orchestrator_policy(mut self, policy: OrchestratorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn ScoringAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapters(mut self, adapters: Vec<Arc<dyn ScoringAdapter>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share a reputation store (e.g. with the chat flow). Without one, a
    /// fresh store is built from the reputation policy.
    pub fn reputation(mut self, store: Arc<ReputationStore>) -> Self {
        self.reputation = Some(store);
        self
    }

    pub fn build(self) -> ModerationResult<Orchestrator> {
        self.policy.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopMetrics) as Arc<dyn MetricsSink>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(MemorySink::new()) as Arc<dyn DecisionSink>);
        let reputation = match self.reputation {
            Some(store) => store,
            None => Arc::new(ReputationStore::new(self.reputation_policy, Arc::clone(&clock))?),
        };

        Ok(Orchestrator {
            triage: TriageTier::new(self.triage, Arc::clone(&reputation))?,
            ml: MlTier::new(self.adapters, self.ml, Arc::clone(&metrics))?,
            escalation: EscalationTier::new(self.escalation, Arc::new(ReviewQueue::new()))?,
            reputation,
            sink,
            metrics,
            clock,
            ledger: DecisionLedger::new(),
            permits: Arc::new(Semaphore::new(self.policy.concurrency)),
            policy: self.policy,
        })
    }
}
