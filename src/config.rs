use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ModerationResult;
use crate::pipeline::OrchestratorPolicy;
use crate::realtime::RealtimePolicy;
use crate::reputation::ReputationPolicy;
use crate::tiers::{EscalationPolicy, MlPolicy, TriagePolicy};
use crate::windowing::WindowPolicy;

/// Where decisions are handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBackend {
    /// In-process only (default); nothing survives the process
    Memory,
    /// SQLite file at `db_path`
    Sqlite,
}

/// Central configuration loaded from environment variables.
///
/// Secrets come from env vars only. A .env file is loaded at startup
/// via dotenvy.
pub struct Config {
    pub db_path: String,
    pub sink_backend: SinkBackend,
    /// Optional JSON file overriding policy defaults
    pub policy_file: Option<String>,
    /// Inference endpoint for the HTTP model adapter (optional)
    pub model_url: Option<String>,
    pub model_api_key: Option<String>,
    pub model_qps: f64,
    pub concurrency: usize,
    /// Chat partition workers
    pub workers: usize,
}

impl Config {
    /// Load configuration from environment variables. Everything has a
    /// default; only the model endpoint is needed for live ML scoring.
    pub fn load() -> Result<Self> {
        let sink_backend = match env::var("SENTINEL_SINK").as_deref() {
            Ok("sqlite") => SinkBackend::Sqlite,
            Ok("memory") | Err(_) => SinkBackend::Memory,
            Ok(other) => anyhow::bail!("Unknown SENTINEL_SINK value {other:?} (expected memory or sqlite)"),
        };

        let default_workers = std::thread::available_parallelism().map_or(4, |n| n.get());

        Ok(Self {
            db_path: env::var("SENTINEL_DB_PATH").unwrap_or_else(|_| "./sentinel.db".to_string()),
            sink_backend,
            policy_file: env::var("SENTINEL_POLICY_FILE").ok().filter(|p| !p.is_empty()),
            model_url: env::var("SENTINEL_MODEL_URL").ok().filter(|u| !u.is_empty()),
            model_api_key: env::var("SENTINEL_MODEL_API_KEY").ok().filter(|k| !k.is_empty()),
            model_qps: parse_var("SENTINEL_MODEL_QPS", 10.0)?,
            concurrency: parse_var("SENTINEL_CONCURRENCY", 64)?,
            workers: parse_var("SENTINEL_WORKERS", default_workers)?,
        })
    }

    /// Check that an inference endpoint is configured.
    /// Call this before building the HTTP model adapter.
    pub fn require_model_endpoint(&self) -> Result<&str> {
        match self.model_url.as_deref() {
            Some(url) => Ok(url),
            None => anyhow::bail!(
                "SENTINEL_MODEL_URL not set. Add it to your .env file.\n\
                 See .env.example for the available variables."
            ),
        }
    }

    /// Policy bundle from SENTINEL_POLICY_FILE, or the defaults.
    pub fn policies(&self) -> Result<PolicyConfig> {
        let mut policies = match &self.policy_file {
            Some(path) => PolicyConfig::load(path)?,
            None => PolicyConfig::default(),
        };
        policies.orchestrator.concurrency = self.concurrency;
        policies.validate()?;
        Ok(policies)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {name}={raw:?}: {e}")),
        _ => Ok(default),
    }
}

/// Every policy knob in one serde bundle. Missing sections and fields keep
/// their defaults, so a policy file only names what it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub triage: TriagePolicy,
    pub ml: MlPolicy,
    pub escalation: EscalationPolicy,
    pub reputation: ReputationPolicy,
    pub orchestrator: OrchestratorPolicy,
    pub window: WindowPolicy,
    pub realtime: RealtimePolicy,
}

impl PolicyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        let policies: PolicyConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))?;
        Ok(policies)
    }

    pub fn validate(&self) -> ModerationResult<()> {
        self.ml.validate()?;
        self.escalation.validate()?;
        self.reputation.validate()?;
        self.orchestrator.validate()?;
        self.window.validate()?;
        self.realtime.validate()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize policies")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_policy_file_keeps_other_defaults() {
        let parsed: PolicyConfig =
            serde_json::from_str(r#"{ "ml": { "high_threshold": 0.9 }, "realtime": { "budget_ms": 5 } }"#).unwrap();
        assert_eq!(parsed.ml.high_threshold, 0.9);
        assert_eq!(parsed.ml.low_threshold, 0.3);
        assert_eq!(parsed.realtime.budget_ms, 5);
        assert_eq!(parsed.triage, TriagePolicy::default());
        parsed.validate().unwrap();
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut policies = PolicyConfig::default();
        policies.ml.low_threshold = 0.9;
        policies.ml.high_threshold = 0.2;
        assert!(policies.validate().is_err());
    }

    #[test]
    fn policy_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let mut policies = PolicyConfig::default();
        policies.escalation.sla.critical = 2;
        std::fs::write(&path, policies.to_json().unwrap()).unwrap();

        let loaded = PolicyConfig::load(&path).unwrap();
        assert_eq!(loaded.escalation.sla.critical, 2);
    }
}
