// Moderation tiers for the content flow.
//
// Tier 1 (triage) is cheap and deterministic, tier 2 (ML) calls the scoring
// adapters and applies thresholds, tier 3 (escalation) hands the item to a
// human. Each tier is a stateless transformer apart from triage's duplicate
// index and submission counters.

pub mod escalation;
pub mod fingerprint;
pub mod ml;
pub mod triage;

pub use escalation::{EscalationPolicy, EscalationTier, ReviewQueue, SlaWindows};
pub use ml::{MlOutcome, MlPolicy, MlTier, MlVerdict};
pub use triage::{HardSignal, HardSignalKind, RateLimits, TriageOutcome, TriagePolicy, TriageTier};
