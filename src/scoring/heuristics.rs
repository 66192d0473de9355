// Structural spam heuristics: character floods, shouting, link stuffing.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::models::{ContentKind, Dimension, ScoreSet};

use super::traits::{LatencyClass, ScoringAdapter, ScoringRequest};

/// Hostnames of every link in `text`, lowercased, without a `www.` prefix.
pub fn link_domains(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|token| {
            let lower = token.to_lowercase();
            let rest = lower
                .strip_prefix("https://")
                .or_else(|| lower.strip_prefix("http://"))
                .or_else(|| lower.strip_prefix("www.").map(|_| lower.as_str()))?;
            let host = rest
                .split(['/', '?', '#', ':'])
                .next()
                .unwrap_or("")
                .trim_start_matches("www.")
                .trim_end_matches(|c: char| !c.is_alphanumeric());
            (!host.is_empty()).then(|| host.to_string())
        })
        .collect()
}

/// Longest run of the same character.
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;
    for c in text.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

/// Fraction of letters that are uppercase, or None for short texts.
fn caps_ratio(text: &str, min_letters: usize) -> Option<f64> {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < min_letters {
        return None;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    Some(upper as f64 / letters.len() as f64)
}

pub struct HeuristicSpamScorer {
    pub repeated_run: usize,
    pub caps_threshold: f64,
    pub caps_min_letters: usize,
    pub link_threshold: usize,
    dimensions: Vec<Dimension>,
}

impl Default for HeuristicSpamScorer {
    fn default() -> Self {
        Self {
            repeated_run: 5,
            caps_threshold: 0.7,
            caps_min_letters: 8,
            link_threshold: 3,
            dimensions: vec![Dimension::SPAM],
        }
    }
}

impl HeuristicSpamScorer {
    /// Spam likelihood for `text` in [0, 1].
    pub fn spam_score(&self, text: &str) -> f64 {
        let mut score: f64 = 0.0;
        if longest_run(text) >= self.repeated_run {
            score += 0.3;
        }
        if caps_ratio(text, self.caps_min_letters).is_some_and(|r| r >= self.caps_threshold) {
            score += 0.3;
        }
        if link_domains(text).len() >= self.link_threshold {
            score += 0.4;
        }
        score.min(1.0)
    }
}

#[async_trait]
impl ScoringAdapter for HeuristicSpamScorer {
    fn name(&self) -> &str {
        "spam_heuristics"
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Realtime
    }

    fn budget(&self) -> Duration {
        Duration::from_millis(2)
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    fn supports(&self, kind: ContentKind) -> bool {
        kind != ContentKind::Image
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreSet, AdapterError> {
        Ok(ScoreSet::new(self.name())
            .with_confidence(0.6)
            .with_score(Dimension::SPAM, self.spam_score(request.text_or_empty())))
    }
}
