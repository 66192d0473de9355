// Real-time decision engine for chat messages.
//
//   received → state_lookup → score → decide → state_update → emit
//
// Everything here runs against in-process state plus adapters rated for the
// realtime latency class. Scoring is capped by what is left of the message
// budget; a late or failed adapter never delays the decision, it sets
// `scoring_timeout` and the configured timeout policy applies.
//
// The decision leans toward blocking: a rate-limit hit blocks outright, and
// a channel burst or a repeated message turns a borderline score into a block.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ModerationError, ModerationResult};
use crate::metrics::MetricsSink;
use crate::models::{
    ChannelWindowState, ChatMessage, Dimension, RealtimeDecision, RealtimeFlags, RealtimeVerdict, RiskTier, ScoreSet,
    UserWindowState,
};
use crate::reputation::ReputationStore;
use crate::scoring::{invoke_with_budget, LatencyClass, PhraseList, ScoringAdapter, ScoringRequest};
use crate::tiers::fingerprint::exact_fingerprint;
use crate::tiers::RateLimits;
use crate::windowing::WindowedStore;

/// What to do with a message whose scores didn't arrive in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Let it through, flagged
    #[default]
    AllowWithFlag,
    /// Block it and queue it for asynchronous human review
    BlockAndQueue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimePolicy {
    /// End-to-end budget per message
    pub budget_ms: u64,
    pub block_threshold: f64,
    /// Scores at or above this block when the channel is bursting or the
    /// message repeats; they also count as violations
    pub borderline_threshold: f64,
    /// Identical messages from one author (this one included) that block
    pub repeat_block_count: u32,
    /// Messages per minute, by the author's reputation tier
    pub rate_limits: RateLimits,
    pub blocked_phrases: Vec<String>,
    pub timeout_policy: TimeoutPolicy,
    /// Per-worker queue length in the partitioned pool
    pub queue_depth: usize,
    /// How long a submission may wait for room in a worker queue
    pub enqueue_timeout_ms: u64,
}

impl Default for RealtimePolicy {
    fn default() -> Self {
        Self {
            budget_ms: 10,
            block_threshold: 0.8,
            borderline_threshold: 0.4,
            repeat_block_count: 3,
            rate_limits: RateLimits {
                normal: 20,
                watch: 10,
                restricted: 5,
                banned: 0,
            },
            blocked_phrases: vec![
                "buy followers".to_string(),
                "free crypto giveaway".to_string(),
            ],
            timeout_policy: TimeoutPolicy::AllowWithFlag,
            queue_depth: 1_024,
            enqueue_timeout_ms: 5,
        }
    }
}

impl RealtimePolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        if self.budget_ms == 0 {
            return Err(ModerationError::InvalidConfig(
                "realtime budget_ms must be positive".to_string(),
            ));
        }
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(self.block_threshold) && in_unit(self.borderline_threshold)) {
            return Err(ModerationError::InvalidConfig(
                "realtime thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.borderline_threshold > self.block_threshold {
            return Err(ModerationError::InvalidConfig(format!(
                "borderline_threshold ({}) must not exceed block_threshold ({})",
                self.borderline_threshold, self.block_threshold
            )));
        }
        if self.repeat_block_count == 0 || self.queue_depth == 0 {
            return Err(ModerationError::InvalidConfig(
                "repeat_block_count and queue_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

struct Scored {
    scores: ScoreSet,
    failed: bool,
}

pub struct RealtimeEngine {
    store: Arc<WindowedStore>,
    adapters: Vec<Arc<dyn ScoringAdapter>>,
    blocked: PhraseList,
    reputation: Option<Arc<ReputationStore>>,
    metrics: Arc<dyn MetricsSink>,
    policy: RealtimePolicy,
}

impl RealtimeEngine {
    /// Only adapters rated `LatencyClass::Realtime` are accepted.
    pub fn new(
        store: Arc<WindowedStore>,
        adapters: Vec<Arc<dyn ScoringAdapter>>,
        policy: RealtimePolicy,
        metrics: Arc<dyn MetricsSink>,
    ) -> ModerationResult<Self> {
        policy.validate()?;
        if let Some(heavy) = adapters
            .iter()
            .find(|a| a.latency_class() != LatencyClass::Realtime)
        {
            return Err(ModerationError::IneligibleAdapter(heavy.name().to_string()));
        }

        Ok(Self {
            store,
            adapters,
            blocked: PhraseList::new(&policy.blocked_phrases),
            reputation: None,
            metrics,
            policy,
        })
    }

    /// Pick rate limits by the author's reputation tier. Reputation is
    /// only read here; chat decisions never update it.
    pub fn with_reputation(mut self, reputation: Arc<ReputationStore>) -> Self {
        self.reputation = Some(reputation);
        self
    }

    pub fn policy(&self) -> &RealtimePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<WindowedStore> {
        &self.store
    }

    /// Decide one message. `received_at` is when the message reached this
    /// process; latency is measured from there to emission.
    pub async fn process(&self, message: &ChatMessage, received_at: Instant) -> RealtimeDecision {
        let budget = self.policy.budget();
        let deadline = received_at + budget;
        let now = message.event_time;
        let fingerprint = exact_fingerprint(&message.text);

        // state_lookup
        let user = self.store.peek_user(&message.author_id, fingerprint, now);
        let channel = self.store.snapshot_channel(&message.channel_id, now);

        // score
        let scored = self.score(message, deadline).await;

        // decide
        let (verdict, flags, violations) = self.decide(message, &user, &channel, &scored);

        // state_update
        self.store
            .record_user(&message.author_id, now, Some(fingerprint));
        self.store
            .record_channel(&message.channel_id, &message.author_id, now, Some(fingerprint));

        // emit
        let latency = received_at.elapsed();
        let flags = RealtimeFlags {
            deadline_exceeded: latency > budget,
            ..flags
        };
        self.emit(message, verdict, flags, violations, scored.scores.max_score(), latency, &user, &channel)
    }

    /// Decision for a message that never reached a worker (pool overload).
    /// Follows the timeout policy without touching window state.
    pub fn default_decision(&self, message: &ChatMessage, received_at: Instant) -> RealtimeDecision {
        let queued = self.policy.timeout_policy == TimeoutPolicy::BlockAndQueue;
        let flags = RealtimeFlags {
            deadline_exceeded: true,
            queued_for_review: queued,
            ..RealtimeFlags::default()
        };
        let verdict = if queued {
            RealtimeVerdict::Block
        } else {
            RealtimeVerdict::Allow
        };
        let user = self.store.snapshot_user(&message.author_id, message.event_time);
        let channel = self.store.snapshot_channel(&message.channel_id, message.event_time);
        self.emit(
            message,
            verdict,
            flags,
            BTreeSet::new(),
            0.0,
            received_at.elapsed(),
            &user,
            &channel,
        )
    }

    async fn score(&self, message: &ChatMessage, deadline: Instant) -> Scored {
        let request = ScoringRequest::for_chat(message);
        let remaining = deadline.saturating_duration_since(Instant::now());

        let calls = self.adapters.iter().map(|adapter| {
            let request = &request;
            async move {
                let budget = adapter.budget().min(remaining);
                invoke_with_budget(adapter.as_ref(), request, budget).await
            }
        });
        let results = join_all(calls).await;

        let mut sets = Vec::with_capacity(results.len());
        let mut failed = false;
        for result in results {
            match result {
                Ok(set) => sets.push(set),
                Err(e) => {
                    let metric = if e.is_timeout() {
                        "adapter.timeout"
                    } else {
                        "adapter.unavailable"
                    };
                    self.metrics.incr(metric, &[("adapter", e.adapter())], 1);
                    debug!(message_id = %message.id, error = %e, "Realtime adapter failed");
                    failed = true;
                }
            }
        }

        Scored {
            scores: ScoreSet::merge("realtime", &sets),
            failed,
        }
    }

    fn author_tier(&self, author_id: &str) -> RiskTier {
        self.reputation
            .as_ref()
            .and_then(|r| r.peek(author_id))
            .map_or(RiskTier::Normal, |record| record.tier)
    }

    fn decide(
        &self,
        message: &ChatMessage,
        user: &UserWindowState,
        channel: &ChannelWindowState,
        scored: &Scored,
    ) -> (RealtimeVerdict, RealtimeFlags, BTreeSet<Dimension>) {
        let p = &self.policy;
        let score = scored.scores.max_score();
        let limit = p.rate_limits.for_tier(self.author_tier(&message.author_id));

        let mut flags = RealtimeFlags {
            rate_limited: user.count_1m >= limit,
            repeat_message: user.repeat_count >= 1,
            burst_detected: channel.burst_detected,
            raid_detected: channel.raid_detected,
            spam_wave_detected: channel.spam_wave_detected,
            scoring_timeout: scored.failed,
            ..RealtimeFlags::default()
        };

        let repeat_block = user.repeat_count + 1 >= p.repeat_block_count;
        let blocklisted = self.blocked.find(&message.text).is_some();
        let hot_context = flags.burst_detected || flags.spam_wave_detected || flags.repeat_message;

        let mut block = score >= p.block_threshold
            || flags.rate_limited
            || (hot_context && score >= p.borderline_threshold)
            || repeat_block
            || blocklisted;

        if flags.scoring_timeout && p.timeout_policy == TimeoutPolicy::BlockAndQueue {
            block = true;
            flags.queued_for_review = true;
        }

        let mut violations: BTreeSet<Dimension> = scored
            .scores
            .scores
            .iter()
            .filter(|(_, v)| **v >= p.borderline_threshold)
            .map(|(d, _)| d.clone())
            .collect();
        if flags.rate_limited || repeat_block {
            violations.insert(Dimension::SPAM);
        }
        if blocklisted {
            violations.insert(Dimension::new("blocklist"));
        }

        let verdict = if block {
            RealtimeVerdict::Block
        } else {
            RealtimeVerdict::Allow
        };
        (verdict, flags, violations)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        message: &ChatMessage,
        verdict: RealtimeVerdict,
        flags: RealtimeFlags,
        violations: BTreeSet<Dimension>,
        score: f64,
        latency: Duration,
        user: &UserWindowState,
        channel: &ChannelWindowState,
    ) -> RealtimeDecision {
        self.metrics
            .incr("chat.processed", &[("decision", verdict.as_str())], 1);
        self.metrics.observe("chat.latency", &[("flow", "chat")], latency);

        debug!(
            message_id = %message.id,
            channel = %message.channel_id,
            decision = %verdict,
            score,
            latency_us = latency.as_micros() as u64,
            rate_limited = flags.rate_limited,
            burst = flags.burst_detected,
            "Chat decision"
        );

        RealtimeDecision {
            message_id: message.id.clone(),
            author_id: message.author_id.clone(),
            channel_id: message.channel_id.clone(),
            decision: verdict,
            violations,
            score,
            latency,
            flags,
            user_count_1m: user.count_1m,
            user_count_5m: user.count_5m,
            channel_rate: channel.rate,
            decided_at: self.store.now(),
        }
    }
}
