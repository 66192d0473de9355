use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::ContentKind;
use super::decision::{EscalationReason, Severity};
use super::scores::Dimension;

/// Human-review priority, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPriority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl ReviewPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewPriority::Low => "low",
            ReviewPriority::Medium => "medium",
            ReviewPriority::High => "high",
            ReviewPriority::Urgent => "urgent",
            ReviewPriority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ReviewPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssignmentState {
    Unassigned,
    Assigned {
        reviewer: String,
        at: DateTime<Utc>,
    },
    Completed {
        reviewer: Option<String>,
        at: DateTime<Utc>,
    },
}

/// A work item for the human review collaborator.
///
/// SLA breach is reported, never destructive: the task stays in the queue
/// until someone completes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub id: Uuid,
    pub content_id: String,
    pub author_id: String,
    pub kind: ContentKind,
    pub priority: ReviewPriority,
    pub reason: EscalationReason,
    pub combined_risk: f64,
    pub confidence: f64,
    pub violations: BTreeSet<Dimension>,
    pub flags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub state: AssignmentState,
}

impl ReviewTask {
    pub fn is_completed(&self) -> bool {
        matches!(self.state, AssignmentState::Completed { .. })
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            AssignmentState::Completed { at, .. } => Some(*at),
            _ => None,
        }
    }

    /// Open tasks past their deadline. Completed tasks never count.
    pub fn is_sla_breached(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed() && now > self.sla_deadline
    }

    /// Time left before the deadline (negative once breached).
    pub fn time_remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.sla_deadline - now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    Reject,
}

/// Enforcement the reviewer chose in addition to the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    #[default]
    None,
    Warn,
    Mute,
    Ban,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::None => "none",
            ReviewAction::Warn => "warn",
            ReviewAction::Mute => "mute",
            ReviewAction::Ban => "ban",
        }
    }
}

/// What the human review collaborator sends back for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub verdict: ReviewVerdict,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub violations: BTreeSet<Dimension>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub action: ReviewAction,
    #[serde(default)]
    pub reviewer: Option<String>,
}

impl ReviewOutcome {
    pub fn approve() -> Self {
        Self {
            verdict: ReviewVerdict::Approve,
            severity: Severity::None,
            violations: BTreeSet::new(),
            notes: None,
            action: ReviewAction::None,
            reviewer: None,
        }
    }

    pub fn reject(severity: Severity) -> Self {
        Self {
            verdict: ReviewVerdict::Reject,
            severity,
            ..Self::approve()
        }
    }
}
