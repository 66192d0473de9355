// Violation dimensions and the ScoreSet produced by every adapter call.
//
// Dimensions are open-ended names rather than a closed enum so that a new
// violation type only needs configuration (weights, thresholds) and an
// adapter that emits it.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A named violation dimension (toxicity, spam, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(Cow<'static, str>);

impl Dimension {
    pub const TOXICITY: Dimension = Dimension(Cow::Borrowed("toxicity"));
    pub const SPAM: Dimension = Dimension(Cow::Borrowed("spam"));
    pub const HATE_SPEECH: Dimension = Dimension(Cow::Borrowed("hate_speech"));
    pub const HARASSMENT: Dimension = Dimension(Cow::Borrowed("harassment"));
    pub const VIOLENCE: Dimension = Dimension(Cow::Borrowed("violence"));
    pub const ADULT_CONTENT: Dimension = Dimension(Cow::Borrowed("adult_content"));
    pub const PROFANITY: Dimension = Dimension(Cow::Borrowed("profanity"));
    pub const THREAT: Dimension = Dimension(Cow::Borrowed("threat"));

    pub fn new(name: impl Into<String>) -> Self {
        Dimension(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Self {
        Dimension::new(name)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scores for a set of dimensions from one adapter invocation (or a merge
/// of several). Never mutated after it is handed to a tier; merging builds
/// a new set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    /// Adapter (or "merged") that produced this set
    pub source: String,
    /// Probability per dimension, always within [0, 1]
    pub scores: BTreeMap<Dimension, f64>,
    /// Scalar confidence in [0, 1]
    pub confidence: f64,
    pub latency: Duration,
    /// Dimensions that were requested but produced no signal
    pub missing: BTreeSet<Dimension>,
    /// Hard signals such as `weapons_detected`
    pub flags: BTreeSet<String>,
}

impl ScoreSet {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            scores: BTreeMap::new(),
            confidence: 1.0,
            latency: Duration::ZERO,
            missing: BTreeSet::new(),
            flags: BTreeSet::new(),
        }
    }

    /// The "no signal" set returned on timeout or unavailability: every
    /// requested dimension is missing and confidence is zero.
    pub fn degraded<'a>(
        source: impl Into<String>,
        dimensions: impl IntoIterator<Item = &'a Dimension>,
        latency: Duration,
    ) -> Self {
        Self {
            source: source.into(),
            scores: BTreeMap::new(),
            confidence: 0.0,
            latency,
            missing: dimensions.into_iter().cloned().collect(),
            flags: BTreeSet::new(),
        }
    }

    pub fn with_score(mut self, dimension: Dimension, value: f64) -> Self {
        self.insert(dimension, value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    pub fn with_missing(mut self, dimension: Dimension) -> Self {
        self.scores.remove(&dimension);
        self.missing.insert(dimension);
        self
    }

    /// Record a score, keeping the higher value if the dimension is
    /// already present.
    pub fn insert(&mut self, dimension: Dimension, value: f64) {
        let value = clamp_unit(value);
        self.missing.remove(&dimension);
        self.scores
            .entry(dimension)
            .and_modify(|existing| *existing = existing.max(value))
            .or_insert(value);
    }

    pub fn get(&self, dimension: &Dimension) -> Option<f64> {
        self.scores.get(dimension).copied()
    }

    /// Highest score across all dimensions (0.0 when empty).
    pub fn max_score(&self) -> f64 {
        self.scores.values().copied().fold(0.0, f64::max)
    }

    /// True if the set carries no usable signal at all.
    pub fn is_degraded(&self) -> bool {
        self.scores.is_empty() && !self.missing.is_empty()
    }

    /// Merge several sets into a new one.
    ///
    /// - scores: per-dimension max
    /// - flags: union
    /// - missing: union, minus anything some other set did provide
    /// - confidence: minimum over sets that carried scores (0.0 if none did
    ///   but something went missing, 1.0 if nothing was asked at all)
    /// - latency: max, since adapters run concurrently
    pub fn merge<'a>(source: impl Into<String>, sets: impl IntoIterator<Item = &'a ScoreSet>) -> Self {
        let mut merged = ScoreSet::new(source);
        let mut missing = BTreeSet::new();
        let mut confidence: Option<f64> = None;

        for set in sets {
            for (dimension, value) in &set.scores {
                merged.insert(dimension.clone(), *value);
            }
            missing.extend(set.missing.iter().cloned());
            merged.flags.extend(set.flags.iter().cloned());
            merged.latency = merged.latency.max(set.latency);
            if !set.scores.is_empty() {
                confidence = Some(confidence.map_or(set.confidence, |c| c.min(set.confidence)));
            }
        }

        missing.retain(|d| !merged.scores.contains_key(d));
        merged.confidence = match confidence {
            Some(c) => c,
            None if !missing.is_empty() => 0.0,
            None => 1.0,
        };
        merged.missing = missing;
        merged
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_clamped_into_unit_range() {
        let set = ScoreSet::new("t")
            .with_score(Dimension::TOXICITY, 1.7)
            .with_score(Dimension::SPAM, -0.2)
            .with_score(Dimension::VIOLENCE, f64::NAN);
        assert_eq!(set.get(&Dimension::TOXICITY), Some(1.0));
        assert_eq!(set.get(&Dimension::SPAM), Some(0.0));
        assert_eq!(set.get(&Dimension::VIOLENCE), Some(0.0));
    }

    #[test]
    fn owned_and_const_dimensions_are_equal() {
        assert_eq!(Dimension::new("toxicity"), Dimension::TOXICITY);
        assert_eq!(Dimension::from("spam").to_string(), "spam");
    }

    #[test]
    fn merge_takes_max_and_clears_recovered_missing() {
        let a = ScoreSet::new("a")
            .with_score(Dimension::TOXICITY, 0.2)
            .with_confidence(0.9);
        let b = ScoreSet::new("b")
            .with_score(Dimension::TOXICITY, 0.6)
            .with_confidence(0.7)
            .with_flag("weapons_detected");
        let c = ScoreSet::degraded("c", [&Dimension::TOXICITY, &Dimension::ADULT_CONTENT], Duration::from_millis(40));

        let merged = ScoreSet::merge("merged", [&a, &b, &c]);
        assert_eq!(merged.get(&Dimension::TOXICITY), Some(0.6));
        assert!((merged.confidence - 0.7).abs() < f64::EPSILON);
        assert!(merged.flags.contains("weapons_detected"));
        // toxicity came back from another adapter, adult_content did not
        assert!(!merged.missing.contains(&Dimension::TOXICITY));
        assert!(merged.missing.contains(&Dimension::ADULT_CONTENT));
        assert_eq!(merged.latency, Duration::from_millis(40));
    }

    #[test]
    fn merge_of_only_degraded_sets_has_zero_confidence() {
        let c = ScoreSet::degraded("c", [&Dimension::TOXICITY], Duration::ZERO);
        let merged = ScoreSet::merge("merged", [&c]);
        assert!(merged.is_degraded());
        assert_eq!(merged.confidence, 0.0);
    }
}
