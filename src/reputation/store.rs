// ReputationStore — the single writer for per-user reputation.
//
// Each user's record sits behind its own DashMap entry; `apply_outcome`
// holds that entry for the whole read-modify-write, so concurrent decisions
// for one author are applied one after another while other authors proceed
// on other shards. No await ever happens with an entry held.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::error::{ModerationError, ModerationResult};
use crate::models::{Decision, DecisionKind, ReputationRecord};
use crate::windowing::BucketedCounter;

use super::policy::{effective_tier, ReputationPolicy};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const SECS_PER_DAY: f64 = 86_400.0;

struct Entry {
    record: ReputationRecord,
    /// Violations per UTC day over the last 30 days
    daily_violations: BucketedCounter,
}

impl Entry {
    fn new(user_id: &str, first_seen: DateTime<Utc>, policy: &ReputationPolicy) -> Self {
        Self {
            record: ReputationRecord {
                user_id: user_id.to_owned(),
                score: policy.initial_score,
                violations_7d: 0,
                violations_30d: 0,
                violations_total: 0,
                consecutive_approvals: 0,
                tier: policy.bands.tier_for(policy.initial_score),
                sanctions: Vec::new(),
                first_seen,
                last_violation: None,
                last_updated: first_seen,
            },
            daily_violations: BucketedCounter::new(DAY, 30),
        }
    }

    /// Copy of the record with rolling counts and sanctions evaluated at
    /// `now`. The stored tier is the score band alone.
    fn snapshot(&self, now: DateTime<Utc>) -> ReputationRecord {
        let mut record = self.record.clone();
        record.violations_7d = self.daily_violations.sum_recent(now, 7);
        record.violations_30d = self.daily_violations.count_at(now);
        record.tier = effective_tier(record.tier, &record.sanctions, now);
        record
    }
}

fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / SECS_PER_DAY
}

pub struct ReputationStore {
    entries: DashMap<String, Entry>,
    policy: ReputationPolicy,
    clock: Arc<dyn Clock>,
}

impl ReputationStore {
    pub fn new(policy: ReputationPolicy, clock: Arc<dyn Clock>) -> ModerationResult<Self> {
        policy.validate()?;
        Ok(Self {
            entries: DashMap::new(),
            policy,
            clock,
        })
    }

    pub fn policy(&self) -> &ReputationPolicy {
        &self.policy
    }

    /// The user's record, creating a default one on first sight.
    pub fn get(&self, user_id: &str) -> ReputationRecord {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(user_id) {
            return entry.snapshot(now);
        }
        self.entries
            .entry(user_id.to_owned())
            .or_insert_with(|| Entry::new(user_id, now, &self.policy))
            .snapshot(now)
    }

    /// Note activity from `user_id` at `at`, creating the record if needed.
    /// `first_seen` is the earliest time ever observed, so account age does
    /// not depend on the order decisions are applied in.
    pub fn observe(&self, user_id: &str, at: DateTime<Utc>) -> ReputationRecord {
        let mut entry = self
            .entries
            .entry(user_id.to_owned())
            .or_insert_with(|| Entry::new(user_id, at, &self.policy));
        let record = &mut entry.record;
        record.first_seen = record.first_seen.min(at);
        entry.snapshot(self.clock.now())
    }

    /// The user's record if one exists, without creating it.
    pub fn peek(&self, user_id: &str) -> Option<ReputationRecord> {
        let now = self.clock.now();
        self.entries.get(user_id).map(|e| e.snapshot(now))
    }

    /// Fold a finalized decision into the author's reputation.
    ///
    /// The decision's own timestamp drives age and recovery math, so
    /// replaying the same decisions yields the same record.
    pub fn apply_outcome(&self, user_id: &str, decision: &Decision) -> ModerationResult<ReputationRecord> {
        let at = decision.decided_at;
        let mut attempts = 0u32;

        let mut entry = loop {
            attempts += 1;
            match self.entries.try_entry(user_id.to_owned()) {
                Some(entry) => break entry.or_insert_with(|| Entry::new(user_id, at, &self.policy)),
                None if attempts >= self.policy.max_update_attempts => {
                    error!(user = user_id, attempts, "Reputation entry stayed locked");
                    return Err(ModerationError::StateStoreContention {
                        key: user_id.to_owned(),
                        attempts,
                    });
                }
                None if attempts < 8 => std::hint::spin_loop(),
                None => std::thread::yield_now(),
            }
        };

        let policy = &self.policy;
        let Entry {
            record,
            daily_violations,
        } = entry.value_mut();
        let before = record.score;
        record.first_seen = record.first_seen.min(at);

        match decision.kind {
            DecisionKind::Rejected => {
                let penalty = policy.penalty(decision.severity, days_between(record.first_seen, at));
                record.score = (record.score - penalty).clamp(0.0, 100.0);
                record.violations_total += 1;
                daily_violations.record_at(at, 1);
                record.last_violation = Some(record.last_violation.map_or(at, |last| last.max(at)));
                record.consecutive_approvals = 0;

                record.sanctions.retain(|s| s.is_active(at));
                let recent = daily_violations.count_at(at);
                if let Some(sanction) = policy.sanctions.sanction_for(decision, recent) {
                    warn!(
                        user = user_id,
                        tier = %sanction.tier,
                        reason = %sanction.reason,
                        until = ?sanction.until,
                        "Automatic sanction"
                    );
                    record.sanctions.push(sanction);
                }
            }
            DecisionKind::Approved => {
                record.consecutive_approvals = record.consecutive_approvals.saturating_add(1);
                if record.consecutive_approvals >= policy.recovery_streak {
                    let since = record.last_violation.map(|last| days_between(last, at));
                    record.score = (record.score + policy.recovery(since)).min(100.0);
                }
            }
            DecisionKind::Escalated => {}
        }

        record.last_updated = record.last_updated.max(at);
        record.tier = policy.bands.tier_for(record.score);

        debug!(
            user = user_id,
            kind = %decision.kind,
            severity = %decision.severity,
            before,
            after = record.score,
            tier = %record.tier,
            "Reputation updated"
        );

        Ok(entry.snapshot(self.clock.now().max(at)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
