// Reputation update policy.
//
// Rejections cost `base_penalty × severity multiplier × age factor`, where
// the age factor shrinks from 1.0 toward `age_floor` as the account gets
// older (established accounts lose less per incident). After
// `recovery_streak` consecutive approvals each further approval restores up
// to `recovery_amount`, scaled by how long ago the last violation was.
// Sanctions add a floor under the tier for repeat or critical offenders.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModerationError, ModerationResult};
use crate::models::{Decision, Dimension, RiskTier, Sanction, Severity};

/// Score bands for each risk tier. A score at or above a band's lower bound
/// lands in that tier; below `restricted` is banned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub normal: f64,
    pub watch: f64,
    pub restricted: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            normal: 60.0,
            watch: 30.0,
            restricted: 10.0,
        }
    }
}

impl RiskBands {
    pub fn tier_for(&self, score: f64) -> RiskTier {
        match score {
            s if s >= self.normal => RiskTier::Normal,
            s if s >= self.watch => RiskTier::Watch,
            s if s >= self.restricted => RiskTier::Restricted,
            _ => RiskTier::Banned,
        }
    }
}

/// Automatic sanctions applied on rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanctionPolicy {
    pub enabled: bool,
    /// Rejections at this severity or above ban permanently
    pub ban_severity: Option<Severity>,
    /// Rejections for any of these ban permanently
    pub ban_dimensions: BTreeSet<Dimension>,
    /// Violations in the last 30 days that put the author on watch
    pub watch_after: u64,
    pub watch_days: i64,
    pub restrict_after: u64,
    pub restrict_hours: i64,
    pub ban_after: u64,
    pub ban_days: i64,
}

impl Default for SanctionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ban_severity: Some(Severity::Critical),
            ban_dimensions: BTreeSet::from([Dimension::THREAT, Dimension::new("csam")]),
            watch_after: 2,
            watch_days: 30,
            restrict_after: 3,
            restrict_hours: 24,
            ban_after: 5,
            ban_days: 30,
        }
    }
}

impl SanctionPolicy {
    /// Sanction earned by a rejection, given the author's violation count
    /// over the last 30 days including this one.
    pub fn sanction_for(&self, decision: &Decision, violations_30d: u64) -> Option<Sanction> {
        if !self.enabled {
            return None;
        }
        let at = decision.decided_at;
        let sanction = |tier, reason: String, until| Sanction {
            tier,
            reason,
            imposed_at: at,
            until,
        };

        if let Some(dimension) = decision.violations.iter().find(|d| self.ban_dimensions.contains(*d)) {
            return Some(sanction(RiskTier::Banned, format!("critical violation: {dimension}"), None));
        }
        if self.ban_severity.is_some_and(|min| decision.severity >= min) {
            return Some(sanction(
                RiskTier::Banned,
                format!("{} severity violation", decision.severity),
                None,
            ));
        }

        let count = violations_30d;
        if count >= self.ban_after {
            Some(sanction(
                RiskTier::Banned,
                format!("{count} violations in 30 days"),
                Some(at + chrono::Duration::days(self.ban_days)),
            ))
        } else if count >= self.restrict_after {
            Some(sanction(
                RiskTier::Restricted,
                format!("{count} violations in 30 days"),
                Some(at + chrono::Duration::hours(self.restrict_hours)),
            ))
        } else if count >= self.watch_after {
            Some(sanction(
                RiskTier::Watch,
                format!("{count} violations in 30 days"),
                Some(at + chrono::Duration::days(self.watch_days)),
            ))
        } else {
            None
        }
    }

    fn validate(&self) -> ModerationResult<()> {
        if !(self.watch_after <= self.restrict_after && self.restrict_after <= self.ban_after) {
            return Err(ModerationError::InvalidConfig(format!(
                "sanction counts must satisfy watch <= restrict <= ban, got {}/{}/{}",
                self.watch_after, self.restrict_after, self.ban_after
            )));
        }
        if self.watch_days <= 0 || self.restrict_hours <= 0 || self.ban_days <= 0 {
            return Err(ModerationError::InvalidConfig(
                "sanction durations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Strictest tier among `band` and the sanctions still active at `now`.
pub fn effective_tier(band: RiskTier, sanctions: &[Sanction], now: DateTime<Utc>) -> RiskTier {
    sanctions
        .iter()
        .filter(|s| s.is_active(now))
        .map(|s| s.tier)
        .fold(band, RiskTier::max)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationPolicy {
    pub initial_score: f64,
    pub base_penalty: f64,
    pub low_multiplier: f64,
    pub medium_multiplier: f64,
    pub high_multiplier: f64,
    pub critical_multiplier: f64,
    /// Lowest fraction of the penalty an old account still pays
    pub age_floor: f64,
    /// Days over which the age factor decays toward the floor
    pub age_decay_days: f64,
    /// Consecutive approvals before recovery kicks in
    pub recovery_streak: u32,
    pub recovery_amount: f64,
    /// Days for recovery to approach its full amount after a violation
    pub recovery_decay_days: f64,
    pub bands: RiskBands,
    pub sanctions: SanctionPolicy,
    /// Author score at or above which plain text skips model scoring
    pub fast_approve_score: f64,
    /// Bounded retries for acquiring a user's entry before reporting contention
    pub max_update_attempts: u32,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            initial_score: 50.0,
            base_penalty: 8.0,
            low_multiplier: 0.5,
            medium_multiplier: 1.0,
            high_multiplier: 1.5,
            critical_multiplier: 3.0,
            age_floor: 0.5,
            age_decay_days: 180.0,
            recovery_streak: 5,
            recovery_amount: 1.0,
            recovery_decay_days: 14.0,
            bands: RiskBands::default(),
            sanctions: SanctionPolicy::default(),
            fast_approve_score: 85.0,
            max_update_attempts: 64,
        }
    }
}

impl ReputationPolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        let b = &self.bands;
        if !(b.normal > b.watch && b.watch > b.restricted && b.restricted >= 0.0 && b.normal <= 100.0) {
            return Err(ModerationError::InvalidConfig(format!(
                "risk bands must satisfy 100 >= normal > watch > restricted >= 0, got {}/{}/{}",
                b.normal, b.watch, b.restricted
            )));
        }
        if !(0.0..=100.0).contains(&self.initial_score) {
            return Err(ModerationError::InvalidConfig(
                "initial_score must be within [0, 100]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.age_floor) || self.age_decay_days <= 0.0 || self.recovery_decay_days <= 0.0 {
            return Err(ModerationError::InvalidConfig(
                "age_floor must be within [0, 1] and decay periods positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.fast_approve_score) {
            return Err(ModerationError::InvalidConfig(
                "fast_approve_score must be within [0, 100]".to_string(),
            ));
        }
        self.sanctions.validate()?;
        if self.max_update_attempts == 0 {
            return Err(ModerationError::InvalidConfig(
                "max_update_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn severity_multiplier(&self, severity: Severity) -> f64 {
        match severity {
            // a rejection always carries some weight
            Severity::None | Severity::Low => self.low_multiplier,
            Severity::Medium => self.medium_multiplier,
            Severity::High => self.high_multiplier,
            Severity::Critical => self.critical_multiplier,
        }
    }

    /// Penalty for one rejection against an account `account_age_days` old.
    pub fn penalty(&self, severity: Severity, account_age_days: f64) -> f64 {
        let age = account_age_days.max(0.0);
        let age_factor = self.age_floor + (1.0 - self.age_floor) * (-age / self.age_decay_days).exp();
        self.base_penalty * self.severity_multiplier(severity) * age_factor
    }

    /// Recovery for one qualifying approval. `None` means no prior violation.
    pub fn recovery(&self, days_since_violation: Option<f64>) -> f64 {
        match days_since_violation {
            None => self.recovery_amount,
            Some(days) => self.recovery_amount * (1.0 - (-days.max(0.0) / self.recovery_decay_days).exp()),
        }
    }
}
