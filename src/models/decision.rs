use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scores::Dimension;

/// How serious a violation is. Drives the reputation penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity implied by a single dimension score.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.95 => Severity::Critical,
            s if s >= 0.85 => Severity::High,
            s if s >= 0.7 => Severity::Medium,
            s if s >= 0.5 => Severity::Low,
            _ => Severity::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approved,
    Rejected,
    Escalated,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Approved => "approved",
            DecisionKind::Rejected => "rejected",
            DecisionKind::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The stage that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTier {
    Triage,
    MachineLearning,
    Escalation,
    HumanReview,
}

impl ProcessingTier {
    /// 1-based tier number as reported in decision records.
    pub fn number(&self) -> u8 {
        match self {
            ProcessingTier::Triage => 1,
            ProcessingTier::MachineLearning => 2,
            ProcessingTier::Escalation => 3,
            ProcessingTier::HumanReview => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingTier::Triage => "triage",
            ProcessingTier::MachineLearning => "ml",
            ProcessingTier::Escalation => "escalation",
            ProcessingTier::HumanReview => "human_review",
        }
    }
}

impl std::fmt::Display for ProcessingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an item ended up in front of a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Combined confidence fell below the configured minimum
    LowConfidence,
    /// Risk landed between the approve and reject thresholds
    Borderline,
    /// A hard flag (weapons, explicit content) demands human eyes
    PolicyRequired,
    /// Concurrency limit reached and the enqueue timeout elapsed
    Overload,
    /// The item-level processing deadline elapsed
    DeadlineExceeded,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::LowConfidence => "low_confidence",
            EscalationReason::Borderline => "borderline",
            EscalationReason::PolicyRequired => "policy_required",
            EscalationReason::Overload => "overload",
            EscalationReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The terminal artifact of the content flow. Exactly one per ContentItem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub content_id: String,
    pub author_id: String,
    pub kind: DecisionKind,
    /// Dimensions whose score crossed their violation threshold
    pub violations: BTreeSet<Dimension>,
    pub severity: Severity,
    /// Combined risk in [0, 1]
    pub combined_risk: f64,
    pub confidence: f64,
    pub tier: ProcessingTier,
    pub processing_time: Duration,
    pub decided_at: DateTime<Utc>,
    /// Set whenever `kind` is Escalated
    pub review_task_id: Option<Uuid>,
    pub escalation_reason: Option<EscalationReason>,
    /// Stage labels in the order the item passed through them
    pub routing_path: Vec<String>,
    pub notes: Vec<String>,
}

impl Decision {
    pub fn is_rejected(&self) -> bool {
        self.kind == DecisionKind::Rejected
    }

    pub fn is_escalated(&self) -> bool {
        self.kind == DecisionKind::Escalated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_score(0.99), Severity::Critical);
        assert_eq!(Severity::from_score(0.9), Severity::High);
        assert_eq!(Severity::from_score(0.7), Severity::Medium);
        assert_eq!(Severity::from_score(0.55), Severity::Low);
        assert_eq!(Severity::from_score(0.2), Severity::None);
        assert_eq!(Severity::from_score(f64::NAN), Severity::None);
    }

    #[test]
    fn tier_numbers_follow_pipeline_order() {
        assert_eq!(ProcessingTier::Triage.number(), 1);
        assert_eq!(ProcessingTier::MachineLearning.number(), 2);
        assert_eq!(ProcessingTier::Escalation.number(), 3);
    }
}
