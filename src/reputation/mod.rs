// Reputation — per-user risk state shared by both moderation flows.
//
// Decisions feed the store (penalties, recovery, rolling violation counts)
// and the store feeds decisions back through the risk tier, which sets how
// strict triage rate limits are for an author. Repeat and critical offenders
// also collect time-boxed sanctions that hold the tier down.

pub mod policy;
pub mod store;

pub use policy::{effective_tier, ReputationPolicy, RiskBands, SanctionPolicy};
pub use store::ReputationStore;
