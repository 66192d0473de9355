// Tier 1 — fast deterministic triage.
//
// Hard signals (blocklisted phrase, critical threat pattern, blocked link
// domain) reject immediately and the item never reaches the ML tier. Soft
// signals (spam/profanity patterns, near-duplicates, submission rate above
// what the author's risk tier allows) become a partial ScoreSet that the ML
// tier merges with its own scores. Plain text from a trusted author who is
// not bursting skips the ML tier once the hard signals are clear.

use std::sync::Arc;

use parking_lot::Mutex;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModerationError, ModerationResult};
use crate::models::{ContentItem, ContentKind, Dimension, RiskTier, ScoreSet, Severity};
use crate::reputation::ReputationStore;
use crate::scoring::heuristics::link_domains;
use crate::scoring::lexicon::{normalize, PhraseList};
use crate::windowing::{KeyedCounters, WindowSpec};

use super::fingerprint::{simhash, FingerprintIndex};

/// Submissions allowed per minute for each risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub normal: u64,
    pub watch: u64,
    pub restricted: u64,
    pub banned: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            normal: 10,
            watch: 5,
            restricted: 2,
            banned: 0,
        }
    }
}

impl RateLimits {
    pub fn for_tier(&self, tier: RiskTier) -> u64 {
        match tier {
            RiskTier::Normal => self.normal,
            RiskTier::Watch => self.watch,
            RiskTier::Restricted => self.restricted,
            RiskTier::Banned => self.banned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriagePolicy {
    pub blocked_phrases: Vec<String>,
    /// Regexes for credible threats; any match rejects
    pub critical_patterns: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub spam_patterns: Vec<String>,
    pub profanity_patterns: Vec<String>,
    pub spam_pattern_score: f64,
    pub profanity_score: f64,
    pub duplicate_score: f64,
    pub rate_exceeded_score: f64,
    pub duplicate_distance: u32,
    pub min_duplicate_words: usize,
    pub fingerprint_capacity: usize,
    pub rate_limits: RateLimits,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            blocked_phrases: vec![
                "buy followers".to_string(),
                "free crypto giveaway".to_string(),
                "send nudes".to_string(),
            ],
            critical_patterns: vec![
                r"(?i)\b(i am going to|i'm going to|im going to|gonna|i will)\s+(kill|shoot|stab|hurt)\s+(you|him|her|them)\b"
                    .to_string(),
                r"(?i)\bkill\s+yourself\b".to_string(),
                r"(?i)\bbomb\s+(threat|the)\b".to_string(),
            ],
            blocked_domains: vec!["malware.test".to_string(), "phish.example".to_string()],
            spam_patterns: vec![
                r"(?i)\b(buy|cheap|discount)\s+(pills|meds|watches)\b".to_string(),
                r"(?i)\bclick\s+here\b".to_string(),
                r"(?i)\b(free|win)\s+(money|cash|prize)\b".to_string(),
                r"(?i)\bmake\s+\$?\d+\s+(per|a)\s+(day|hour|week)\b".to_string(),
            ],
            profanity_patterns: vec![r"(?i)\b(f+u+c+k+|s+h+i+t+|b+i+t+c+h+)\w*".to_string()],
            spam_pattern_score: 0.6,
            profanity_score: 0.5,
            duplicate_score: 0.7,
            rate_exceeded_score: 0.8,
            duplicate_distance: 3,
            min_duplicate_words: 4,
            fingerprint_capacity: 10_000,
            rate_limits: RateLimits::default(),
        }
    }
}

fn compile_all(patterns: &[String]) -> ModerationResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ModerationError::InvalidConfig(format!("invalid pattern {p:?}: {e}")))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardSignalKind {
    BlockedPhrase,
    CriticalPattern,
    BlockedDomain,
}

impl HardSignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardSignalKind::BlockedPhrase => "blocked_phrase",
            HardSignalKind::CriticalPattern => "critical_pattern",
            HardSignalKind::BlockedDomain => "blocked_domain",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HardSignal {
    pub kind: HardSignalKind,
    pub detail: String,
    pub dimension: Dimension,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriageOutcome {
    /// Terminal: reject without consulting the ML tier
    Reject(HardSignal),
    /// Terminal: approve a trusted author's plain text without scoring it
    FastApprove { reputation: f64 },
    /// Continue to the ML tier with whatever soft signals were found
    Pass { partial: ScoreSet, signals: Vec<String> },
}

pub struct TriageTier {
    policy: TriagePolicy,
    blocked_phrases: PhraseList,
    critical: Vec<Regex>,
    spam: Vec<Regex>,
    profanity: Vec<Regex>,
    fingerprints: Mutex<FingerprintIndex>,
    submissions: KeyedCounters,
    reputation: Arc<ReputationStore>,
}

impl TriageTier {
    pub fn new(policy: TriagePolicy, reputation: Arc<ReputationStore>) -> ModerationResult<Self> {
        Ok(Self {
            blocked_phrases: PhraseList::new(&policy.blocked_phrases),
            critical: compile_all(&policy.critical_patterns)?,
            spam: compile_all(&policy.spam_patterns)?,
            profanity: compile_all(&policy.profanity_patterns)?,
            fingerprints: Mutex::new(FingerprintIndex::new(
                policy.fingerprint_capacity,
                policy.duplicate_distance,
            )),
            submissions: KeyedCounters::new(vec![WindowSpec::new(1_000, 60)]),
            reputation,
            policy,
        })
    }

    fn blocked_domain(&self, item: &ContentItem) -> Option<String> {
        let mut domains = link_domains(item.text_or_empty());
        if let Some(payload) = &item.payload_ref {
            domains.extend(link_domains(payload));
        }
        domains.into_iter().find(|domain| {
            self.policy
                .blocked_domains
                .iter()
                .any(|blocked| domain == blocked || domain.ends_with(&format!(".{blocked}")))
        })
    }

    fn hard_signal(&self, item: &ContentItem) -> Option<HardSignal> {
        let text = item.text_or_empty();

        if let Some(phrase) = self.blocked_phrases.find(text) {
            return Some(HardSignal {
                kind: HardSignalKind::BlockedPhrase,
                detail: phrase.to_string(),
                dimension: Dimension::new("blocklist"),
                severity: Severity::High,
            });
        }
        if let Some(pattern) = self.critical.iter().find(|re| re.is_match(text)) {
            return Some(HardSignal {
                kind: HardSignalKind::CriticalPattern,
                detail: pattern.as_str().to_string(),
                dimension: Dimension::THREAT,
                severity: Severity::Critical,
            });
        }
        self.blocked_domain(item).map(|domain| HardSignal {
            kind: HardSignalKind::BlockedDomain,
            detail: domain,
            dimension: Dimension::SPAM,
            severity: Severity::High,
        })
    }

    /// Run every triage check for `item`.
    pub fn evaluate(&self, item: &ContentItem) -> TriageOutcome {
        // Count the submission before anything can short-circuit, so
        // rejected items still weigh on the author's rate.
        let submitted = self
            .submissions
            .record(&item.author_id, item.submitted_at)
            .first()
            .copied()
            .unwrap_or(0);

        let record = self.reputation.observe(&item.author_id, item.submitted_at);

        if let Some(signal) = self.hard_signal(item) {
            debug!(
                content_id = %item.id,
                signal = signal.kind.as_str(),
                detail = %signal.detail,
                "Triage hard block"
            );
            return TriageOutcome::Reject(signal);
        }

        let limit = self.policy.rate_limits.for_tier(record.tier);
        let bursting = submitted.saturating_mul(2) > limit;
        if item.kind == ContentKind::Text
            && item.payload_ref.is_none()
            && record.tier == RiskTier::Normal
            && record.score >= self.reputation.policy().fast_approve_score
            && !bursting
        {
            debug!(content_id = %item.id, reputation = record.score, "Triage fast approve");
            return TriageOutcome::FastApprove { reputation: record.score };
        }

        let text = item.text_or_empty();
        let mut partial = ScoreSet::new("triage");
        let mut signals = Vec::new();

        if self.spam.iter().any(|re| re.is_match(text)) {
            partial.insert(Dimension::SPAM, self.policy.spam_pattern_score);
            signals.push("spam_pattern".to_string());
        }
        if self.profanity.iter().any(|re| re.is_match(text)) {
            partial.insert(Dimension::PROFANITY, self.policy.profanity_score);
            signals.push("profanity_pattern".to_string());
        }

        let word_count = normalize(text).split(' ').filter(|w| !w.is_empty()).count();
        if word_count >= self.policy.min_duplicate_words {
            let hash = simhash(text);
            if let Some(distance) = self.fingerprints.lock().check_and_insert(hash) {
                partial.insert(Dimension::SPAM, self.policy.duplicate_score);
                signals.push(format!("near_duplicate(distance={distance})"));
            }
        }

        let tier = record.tier;
        if submitted > limit {
            partial.insert(Dimension::SPAM, self.policy.rate_exceeded_score);
            signals.push(format!("rate_exceeded({submitted}/{limit} per minute, tier {tier})"));
        }

        TriageOutcome::Pass { partial, signals }
    }

    /// Drop submission counters for authors idle since `older_than`.
    pub fn evict_idle(&self, older_than: chrono::DateTime<chrono::Utc>) -> usize {
        self.submissions.evict(older_than)
    }

    pub fn indexed_fingerprints(&self) -> usize {
        self.fingerprints.lock().len()
    }
}
