// Combined risk — folds a merged ScoreSet into one scalar in [0, 1].
//
// Weights are configuration keyed by dimension name and are normalized to
// sum to 1.0. Three combine strategies are available; all of them are
// non-decreasing in every individual dimension score:
//
//   WeightedSum  Σ wᵢ·sᵢ
//   Max          max over weighted dimensions of sᵢ
//   Blend        (1 − m)·WeightedSum + m·Max     (default, m = 0.5)
//
// A weighted dimension that was requested but produced no signal counts as
// `missing_signal_score` (maximal uncertainty), never as zero risk.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ModerationError, ModerationResult};
use crate::models::{Dimension, ScoreSet, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombineStrategy {
    WeightedSum,
    Max,
    Blend { max_share: f64 },
}

impl Default for CombineStrategy {
    fn default() -> Self {
        CombineStrategy::Blend { max_share: 0.5 }
    }
}

/// Default dimension weights (already summing to 1.0).
pub fn default_weights() -> BTreeMap<Dimension, f64> {
    BTreeMap::from([
        (Dimension::TOXICITY, 0.25),
        (Dimension::HATE_SPEECH, 0.20),
        (Dimension::HARASSMENT, 0.15),
        (Dimension::VIOLENCE, 0.15),
        (Dimension::ADULT_CONTENT, 0.10),
        (Dimension::SPAM, 0.10),
        (Dimension::PROFANITY, 0.05),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskModel {
    weights: BTreeMap<Dimension, f64>,
    strategy: CombineStrategy,
    missing_signal_score: f64,
}

impl Default for RiskModel {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            strategy: CombineStrategy::default(),
            missing_signal_score: 0.5,
        }
    }
}

impl RiskModel {
    /// Build a model, normalizing `weights` to sum to 1.0.
    pub fn new(
        weights: BTreeMap<Dimension, f64>,
        strategy: CombineStrategy,
        missing_signal_score: f64,
    ) -> ModerationResult<Self> {
        if weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ModerationError::InvalidConfig(
                "dimension weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Err(ModerationError::InvalidConfig(
                "dimension weights must have a positive total".to_string(),
            ));
        }
        if let CombineStrategy::Blend { max_share } = strategy {
            if !(0.0..=1.0).contains(&max_share) {
                return Err(ModerationError::InvalidConfig(format!(
                    "blend max_share must be within [0, 1], got {max_share}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&missing_signal_score) {
            return Err(ModerationError::InvalidConfig(format!(
                "missing_signal_score must be within [0, 1], got {missing_signal_score}"
            )));
        }

        let weights = weights
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(d, w)| (d, w / total))
            .collect();

        Ok(Self {
            weights,
            strategy,
            missing_signal_score,
        })
    }

    pub fn weights(&self) -> &BTreeMap<Dimension, f64> {
        &self.weights
    }

    pub fn strategy(&self) -> CombineStrategy {
        self.strategy
    }

    /// Effective value for one weighted dimension, or None if the dimension
    /// was never asked about.
    fn effective(&self, scores: &ScoreSet, dimension: &Dimension) -> Option<f64> {
        match scores.get(dimension) {
            Some(v) => Some(v),
            None if scores.missing.contains(dimension) => Some(self.missing_signal_score),
            None => None,
        }
    }

    /// Combined risk in [0, 1].
    pub fn combine(&self, scores: &ScoreSet) -> f64 {
        let mut weighted_sum = 0.0;
        let mut max: f64 = 0.0;
        for (dimension, weight) in &self.weights {
            if let Some(value) = self.effective(scores, dimension) {
                weighted_sum += weight * value;
                max = max.max(value);
            }
        }

        let risk = match self.strategy {
            CombineStrategy::WeightedSum => weighted_sum,
            CombineStrategy::Max => max,
            CombineStrategy::Blend { max_share } => (1.0 - max_share) * weighted_sum + max_share * max,
        };
        risk.clamp(0.0, 1.0)
    }

    /// Fraction of weighted dimensions (among those asked about) that
    /// actually produced a signal. 1.0 when none were asked about.
    pub fn coverage(&self, scores: &ScoreSet) -> f64 {
        let asked = self
            .weights
            .keys()
            .filter(|d| scores.scores.contains_key(*d) || scores.missing.contains(*d))
            .count();
        if asked == 0 {
            return 1.0;
        }
        let answered = self.weights.keys().filter(|d| scores.scores.contains_key(*d)).count();
        answered as f64 / asked as f64
    }

    /// Full assessment of a merged ScoreSet.
    pub fn assess(&self, scores: ScoreSet, thresholds: &ViolationThresholds) -> Assessment {
        let combined_risk = self.combine(&scores);
        let confidence = (scores.confidence * self.coverage(&scores)).clamp(0.0, 1.0);
        let violations = thresholds.violations(&scores);
        let severity = violations
            .iter()
            .filter_map(|d| scores.get(d))
            .map(Severity::from_score)
            .max()
            .unwrap_or(Severity::None);

        Assessment {
            combined_risk,
            confidence,
            violations,
            severity,
            scores,
        }
    }
}

/// Per-dimension score at or above which a dimension counts as a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationThresholds {
    pub default: f64,
    pub overrides: BTreeMap<Dimension, f64>,
}

impl Default for ViolationThresholds {
    fn default() -> Self {
        Self {
            default: 0.7,
            overrides: BTreeMap::new(),
        }
    }
}

impl ViolationThresholds {
    pub fn threshold(&self, dimension: &Dimension) -> f64 {
        self.overrides.get(dimension).copied().unwrap_or(self.default)
    }

    pub fn violations(&self, scores: &ScoreSet) -> BTreeSet<Dimension> {
        scores
            .scores
            .iter()
            .filter(|(d, v)| **v >= self.threshold(d))
            .map(|(d, _)| d.clone())
            .collect()
    }
}

/// A merged ScoreSet together with everything derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub combined_risk: f64,
    pub confidence: f64,
    pub violations: BTreeSet<Dimension>,
    pub severity: Severity,
    pub scores: ScoreSet,
}

impl Assessment {
    /// Placeholder for items escalated before any tier produced scores.
    pub fn unscored() -> Self {
        Self {
            combined_risk: 0.0,
            confidence: 0.0,
            violations: BTreeSet::new(),
            severity: Severity::None,
            scores: ScoreSet::new("unscored").with_confidence(0.0),
        }
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.scores.flags
    }
}
