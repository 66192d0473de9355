use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk tier derived from the reputation score through configurable bands.
/// Ordered from least to most restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Normal,
    Watch,
    Restricted,
    Banned,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Normal => "normal",
            RiskTier::Watch => "watch",
            RiskTier::Restricted => "restricted",
            RiskTier::Banned => "banned",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An automatic restriction layered over the score-derived tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sanction {
    pub tier: RiskTier,
    pub reason: String,
    pub imposed_at: DateTime<Utc>,
    /// None for a permanent sanction
    pub until: Option<DateTime<Utc>>,
}

impl Sanction {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until.map_or(true, |until| now < until)
    }
}

/// Per-user reputation. Only the reputation store writes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub user_id: String,
    /// Bounded to [0, 100], starts at 50
    pub score: f64,
    pub violations_7d: u64,
    pub violations_30d: u64,
    pub violations_total: u64,
    pub consecutive_approvals: u32,
    /// Effective tier: the stricter of the score band and any active sanction
    pub tier: RiskTier,
    #[serde(default)]
    pub sanctions: Vec<Sanction>,
    pub first_seen: DateTime<Utc>,
    pub last_violation: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}
