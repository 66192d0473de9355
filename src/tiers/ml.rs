// Tier 2 — model-based scoring and the approve/reject/escalate policy.
//
// Every adapter that supports the item's kind runs concurrently, each
// capped by min(its own budget, the tier's aggregate budget). Failures are
// reported as adapter health metrics and folded in as missing dimensions, so
// a dead classifier pushes items toward human review rather than approval.
// A kind no adapter supports is scored as entirely missing for the same reason.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ModerationError, ModerationResult};
use crate::metrics::MetricsSink;
use crate::models::{ContentItem, Dimension, EscalationReason, ScoreSet};
use crate::scoring::risk::default_weights;
use crate::scoring::{invoke_or_degrade, Assessment, CombineStrategy, RiskModel, ScoringAdapter, ScoringRequest, ViolationThresholds};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlPolicy {
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub min_confidence: f64,
    pub violations: ViolationThresholds,
    /// Flags that must never be auto-approved
    pub hard_flags: BTreeSet<String>,
    pub weights: BTreeMap<Dimension, f64>,
    pub strategy: CombineStrategy,
    pub missing_signal_score: f64,
    pub aggregate_budget_ms: u64,
}

impl Default for MlPolicy {
    fn default() -> Self {
        Self {
            low_threshold: 0.3,
            high_threshold: 0.85,
            min_confidence: 0.6,
            violations: ViolationThresholds::default(),
            hard_flags: ["weapons_detected", "explicit_content", "self_harm"]
                .into_iter()
                .map(String::from)
                .collect(),
            weights: default_weights(),
            strategy: CombineStrategy::default(),
            missing_signal_score: 0.5,
            aggregate_budget_ms: 500,
        }
    }
}

impl MlPolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(self.low_threshold) && in_unit(self.high_threshold) && in_unit(self.min_confidence)) {
            return Err(ModerationError::InvalidConfig(
                "ML thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.low_threshold >= self.high_threshold {
            return Err(ModerationError::InvalidConfig(format!(
                "low_threshold ({}) must be below high_threshold ({})",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.aggregate_budget_ms == 0 {
            return Err(ModerationError::InvalidConfig(
                "aggregate_budget_ms must be positive".to_string(),
            ));
        }
        self.risk_model().map(|_| ())
    }

    pub fn risk_model(&self) -> ModerationResult<RiskModel> {
        RiskModel::new(self.weights.clone(), self.strategy, self.missing_signal_score)
    }

    pub fn aggregate_budget(&self) -> Duration {
        Duration::from_millis(self.aggregate_budget_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlVerdict {
    Approve,
    Reject,
    Escalate(EscalationReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlOutcome {
    pub assessment: Assessment,
    pub verdict: MlVerdict,
    /// Adapters that timed out or were unavailable
    pub degraded: Vec<String>,
}

pub struct MlTier {
    adapters: Vec<Arc<dyn ScoringAdapter>>,
    risk: RiskModel,
    policy: MlPolicy,
    metrics: Arc<dyn MetricsSink>,
}

impl MlTier {
    pub fn new(
        adapters: Vec<Arc<dyn ScoringAdapter>>,
        policy: MlPolicy,
        metrics: Arc<dyn MetricsSink>,
    ) -> ModerationResult<Self> {
        policy.validate()?;
        Ok(Self {
            risk: policy.risk_model()?,
            adapters,
            policy,
            metrics,
        })
    }

    pub fn policy(&self) -> &MlPolicy {
        &self.policy
    }

    pub fn risk_model(&self) -> &RiskModel {
        &self.risk
    }

    /// Score `item` with every eligible adapter and merge with `partial`.
    pub async fn score(&self, item: &ContentItem, partial: &ScoreSet) -> MlOutcome {
        let request = ScoringRequest::for_content(item);
        let aggregate = self.policy.aggregate_budget();

        let eligible: Vec<&Arc<dyn ScoringAdapter>> =
            self.adapters.iter().filter(|a| a.supports(item.kind)).collect();
        let uncovered = eligible.is_empty();

        let calls = eligible
            .into_iter()
            .map(|adapter| {
                let request = &request;
                async move {
                    let budget = adapter.budget().min(aggregate);
                    invoke_or_degrade(adapter.as_ref(), request, budget).await
                }
            });
        let results = join_all(calls).await;

        let mut sets = Vec::with_capacity(results.len() + 1);
        sets.push(partial.clone());
        let mut degraded = Vec::new();
        for (set, failure) in results {
            if let Some(err) = failure {
                let metric = if err.is_timeout() {
                    "adapter.timeout"
                } else {
                    "adapter.unavailable"
                };
                self.metrics.incr(metric, &[("adapter", err.adapter())], 1);
                warn!(content_id = %item.id, error = %err, "Adapter degraded, treating its dimensions as missing");
                degraded.push(err.adapter().to_string());
            }
            sets.push(set);
        }

        if uncovered {
            // Nothing can judge this kind: every weighted dimension is unknown
            self.metrics.incr("ml.uncovered", &[("kind", item.kind.as_str())], 1);
            warn!(content_id = %item.id, kind = item.kind.as_str(), "No adapter supports this content kind");
            sets.push(ScoreSet::degraded("uncovered", self.risk.weights().keys(), Duration::ZERO));
        }

        let merged = ScoreSet::merge("merged", &sets);
        let assessment = self.risk.assess(merged, &self.policy.violations);
        let verdict = self.decide(&assessment);
        MlOutcome {
            assessment,
            verdict,
            degraded,
        }
    }

    /// Thresholds applied in order: confidence, reject, approve, borderline.
    pub fn decide(&self, assessment: &Assessment) -> MlVerdict {
        let p = &self.policy;
        let hard_flag = assessment.flags().iter().any(|f| p.hard_flags.contains(f));

        if assessment.confidence < p.min_confidence {
            MlVerdict::Escalate(EscalationReason::LowConfidence)
        } else if assessment.combined_risk > p.high_threshold {
            MlVerdict::Reject
        } else if assessment.combined_risk < p.low_threshold {
            if hard_flag {
                MlVerdict::Escalate(EscalationReason::PolicyRequired)
            } else {
                MlVerdict::Approve
            }
        } else {
            MlVerdict::Escalate(EscalationReason::Borderline)
        }
    }
}
