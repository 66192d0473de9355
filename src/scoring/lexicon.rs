// Word/phrase lexicon scorer.
//
// Each dimension has a list of weighted terms. Matched weights combine as a
// noisy-or (1 - product of (1 - w)), so every extra hit raises the score and
// the result never leaves [0, 1]. Cheap enough for the chat path.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::models::{ContentKind, Dimension, ScoreSet};

use super::traits::{requested_dimensions, LatencyClass, ScoringAdapter, ScoringRequest};

/// Lowercase, strip punctuation to spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True if `phrase` (already normalized) occurs on word boundaries inside
/// `normalized`.
fn contains_phrase(padded: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    padded.contains(&format!(" {phrase} "))
}

/// Case-insensitive whole-word phrase list (blocklists).
#[derive(Debug, Clone, Default)]
pub struct PhraseList {
    phrases: Vec<String>,
}

impl PhraseList {
    pub fn new<S: AsRef<str>>(phrases: impl IntoIterator<Item = S>) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The first listed phrase found in `text`.
    pub fn find(&self, text: &str) -> Option<&str> {
        let padded = format!(" {} ", normalize(text));
        self.phrases
            .iter()
            .find(|p| contains_phrase(&padded, p))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Term {
    phrase: String,
    weight: f64,
}

pub struct LexiconScorer {
    name: String,
    terms: BTreeMap<Dimension, Vec<Term>>,
    dimensions: Vec<Dimension>,
    confidence: f64,
    budget: Duration,
}

impl LexiconScorer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terms: BTreeMap::new(),
            dimensions: Vec::new(),
            confidence: 0.75,
            budget: Duration::from_millis(2),
        }
    }

    /// Add weighted terms for a dimension.
    pub fn with_terms<S: AsRef<str>>(mut self, dimension: Dimension, terms: impl IntoIterator<Item = (S, f64)>) -> Self {
        let list = self.terms.entry(dimension.clone()).or_default();
        list.extend(terms.into_iter().map(|(phrase, weight)| Term {
            phrase: normalize(phrase.as_ref()),
            weight: weight.clamp(0.0, 1.0),
        }));
        if !self.dimensions.contains(&dimension) {
            self.dimensions.push(dimension);
        }
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Noisy-or score for one dimension against already padded text.
    fn score_dimension(&self, dimension: &Dimension, padded: &str) -> f64 {
        let Some(terms) = self.terms.get(dimension) else {
            return 0.0;
        };
        let survival: f64 = terms
            .iter()
            .filter(|t| contains_phrase(padded, &t.phrase))
            .map(|t| 1.0 - t.weight)
            .product();
        1.0 - survival
    }

    /// Score raw text for every dimension this lexicon knows.
    pub fn score_text(&self, text: &str) -> BTreeMap<Dimension, f64> {
        let padded = format!(" {} ", normalize(text));
        self.dimensions
            .iter()
            .map(|d| (d.clone(), self.score_dimension(d, &padded)))
            .collect()
    }
}

impl Default for LexiconScorer {
    /// A small general-purpose lexicon covering the common chat dimensions.
    fn default() -> Self {
        LexiconScorer::new("lexicon")
            .with_terms(
                Dimension::TOXICITY,
                [
                    ("idiot", 0.55),
                    ("stupid", 0.45),
                    ("moron", 0.6),
                    ("loser", 0.45),
                    ("pathetic", 0.5),
                    ("worthless", 0.6),
                    ("trash", 0.35),
                    ("dumb", 0.4),
                    ("shut up", 0.4),
                    ("you suck", 0.55),
                ],
            )
            .with_terms(
                Dimension::HARASSMENT,
                [
                    ("nobody likes you", 0.7),
                    ("everyone hates you", 0.75),
                    ("i know where you live", 0.9),
                    ("you should leave", 0.45),
                    ("go away", 0.3),
                ],
            )
            .with_terms(
                Dimension::HATE_SPEECH,
                [
                    ("subhuman", 0.85),
                    ("vermin", 0.6),
                    ("go back to your country", 0.85),
                    ("inferior race", 0.9),
                ],
            )
            .with_terms(
                Dimension::VIOLENCE,
                [
                    ("kill", 0.5),
                    ("shoot", 0.45),
                    ("stab", 0.6),
                    ("beat you", 0.6),
                    ("hurt you", 0.6),
                ],
            )
            .with_terms(
                Dimension::PROFANITY,
                [
                    ("damn", 0.3),
                    ("crap", 0.3),
                    ("wtf", 0.35),
                    ("shit", 0.6),
                    ("fuck", 0.7),
                    ("bastard", 0.6),
                    ("asshole", 0.7),
                ],
            )
    }
}

#[async_trait]
impl ScoringAdapter for LexiconScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Realtime
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    fn supports(&self, kind: ContentKind) -> bool {
        matches!(kind, ContentKind::Text | ContentKind::Profile)
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreSet, AdapterError> {
        let padded = format!(" {} ", normalize(request.text_or_empty()));
        let mut set = ScoreSet::new(self.name.as_str()).with_confidence(self.confidence);
        for dimension in requested_dimensions(self, request) {
            let score = self.score_dimension(&dimension, &padded);
            set.insert(dimension, score);
        }
        Ok(set)
    }
}
