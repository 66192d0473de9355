// Tier 3 — human review task creation and the review queue.
//
// Priority is a monotonic step function of combined risk, forced to Critical
// by hard flags or a policy-required escalation, and floored at Medium for
// items escalated by overload or deadline (nothing is known about them).
// The SLA deadline is creation time plus the priority's window.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{ModerationError, ModerationResult};
use crate::models::{AssignmentState, ContentItem, EscalationReason, ReviewPriority, ReviewTask};
use crate::scoring::Assessment;

/// SLA window per priority, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaWindows {
    pub critical: i64,
    pub urgent: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl Default for SlaWindows {
    fn default() -> Self {
        Self {
            critical: 5,
            urgent: 15,
            high: 60,
            medium: 240,
            low: 1440,
        }
    }
}

impl SlaWindows {
    pub fn window(&self, priority: ReviewPriority) -> Duration {
        let minutes = match priority {
            ReviewPriority::Critical => self.critical,
            ReviewPriority::Urgent => self.urgent,
            ReviewPriority::High => self.high,
            ReviewPriority::Medium => self.medium,
            ReviewPriority::Low => self.low,
        };
        Duration::minutes(minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    pub sla: SlaWindows,
    /// Risk at or above which a task is Urgent
    pub urgent_risk: f64,
    pub high_risk: f64,
    pub medium_risk: f64,
    /// Flags that force Critical priority regardless of score
    pub critical_flags: BTreeSet<String>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            sla: SlaWindows::default(),
            urgent_risk: 0.85,
            high_risk: 0.65,
            medium_risk: 0.35,
            critical_flags: ["weapons_detected", "explicit_content", "self_harm"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl EscalationPolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        if !(self.urgent_risk >= self.high_risk && self.high_risk >= self.medium_risk) {
            return Err(ModerationError::InvalidConfig(
                "priority bands must satisfy urgent >= high >= medium".to_string(),
            ));
        }
        let s = &self.sla;
        if [s.critical, s.urgent, s.high, s.medium, s.low].iter().any(|m| *m <= 0) {
            return Err(ModerationError::InvalidConfig(
                "SLA windows must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn priority(
        &self,
        combined_risk: f64,
        flags: &BTreeSet<String>,
        reason: EscalationReason,
    ) -> ReviewPriority {
        if reason == EscalationReason::PolicyRequired || flags.iter().any(|f| self.critical_flags.contains(f)) {
            return ReviewPriority::Critical;
        }

        let by_risk = match combined_risk {
            r if r >= self.urgent_risk => ReviewPriority::Urgent,
            r if r >= self.high_risk => ReviewPriority::High,
            r if r >= self.medium_risk => ReviewPriority::Medium,
            _ => ReviewPriority::Low,
        };

        match reason {
            EscalationReason::Overload | EscalationReason::DeadlineExceeded => by_risk.max(ReviewPriority::Medium),
            _ => by_risk,
        }
    }
}

/// Open and completed review tasks, keyed by task id.
#[derive(Default)]
pub struct ReviewQueue {
    tasks: DashMap<Uuid, ReviewTask>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: ReviewTask) {
        self.tasks.insert(task.id, task);
    }

    pub fn get(&self, id: Uuid) -> Option<ReviewTask> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn assign(&self, id: Uuid, reviewer: &str, at: DateTime<Utc>) -> ModerationResult<ReviewTask> {
        let mut task = self.tasks.get_mut(&id).ok_or(ModerationError::UnknownReviewTask(id))?;
        if !task.is_completed() {
            task.state = AssignmentState::Assigned {
                reviewer: reviewer.to_owned(),
                at,
            };
        }
        Ok(task.clone())
    }

    /// Mark a task completed. Completing twice keeps the first completion;
    /// the flag is true only for the call that actually completed it.
    pub fn complete(
        &self,
        id: Uuid,
        reviewer: Option<String>,
        at: DateTime<Utc>,
    ) -> ModerationResult<(ReviewTask, bool)> {
        let mut task = self.tasks.get_mut(&id).ok_or(ModerationError::UnknownReviewTask(id))?;
        if task.is_completed() {
            return Ok((task.clone(), false));
        }
        let reviewer = reviewer.or_else(|| match &task.state {
            AssignmentState::Assigned { reviewer, .. } => Some(reviewer.clone()),
            _ => None,
        });
        task.state = AssignmentState::Completed { reviewer, at };
        Ok((task.clone(), true))
    }

    /// Open tasks past their SLA deadline. Reported only; nothing is removed.
    pub fn breached(&self, now: DateTime<Utc>) -> Vec<ReviewTask> {
        let mut breached: Vec<ReviewTask> = self
            .tasks
            .iter()
            .filter(|t| t.is_sla_breached(now))
            .map(|t| t.clone())
            .collect();
        breached.sort_by_key(|t| t.sla_deadline);
        breached
    }

    /// Open tasks, highest priority first, then earliest deadline.
    pub fn pending(&self) -> Vec<ReviewTask> {
        let mut open: Vec<ReviewTask> = self
            .tasks
            .iter()
            .filter(|t| !t.is_completed())
            .map(|t| t.clone())
            .collect();
        open.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sla_deadline.cmp(&b.sla_deadline)));
        open
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub struct EscalationTier {
    policy: EscalationPolicy,
    queue: Arc<ReviewQueue>,
}

impl EscalationTier {
    pub fn new(policy: EscalationPolicy, queue: Arc<ReviewQueue>) -> ModerationResult<Self> {
        policy.validate()?;
        Ok(Self { policy, queue })
    }

    pub fn queue(&self) -> &Arc<ReviewQueue> {
        &self.queue
    }

    /// Create and enqueue a review task for `item`.
    pub fn create_task(
        &self,
        item: &ContentItem,
        assessment: &Assessment,
        reason: EscalationReason,
        now: DateTime<Utc>,
    ) -> ReviewTask {
        let priority = self
            .policy
            .priority(assessment.combined_risk, assessment.flags(), reason);
        let task = ReviewTask {
            id: Uuid::new_v4(),
            content_id: item.id.clone(),
            author_id: item.author_id.clone(),
            kind: item.kind,
            priority,
            reason,
            combined_risk: assessment.combined_risk,
            confidence: assessment.confidence,
            violations: assessment.violations.clone(),
            flags: assessment.flags().clone(),
            created_at: now,
            sla_deadline: now + self.policy.sla.window(priority),
            state: AssignmentState::Unassigned,
        };

        info!(
            task_id = %task.id,
            content_id = %item.id,
            priority = %priority,
            reason = %reason,
            risk = assessment.combined_risk,
            "Review task created"
        );

        self.queue.insert(task.clone());
        task
    }
}
