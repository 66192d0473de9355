// Content flow — tiered moderation of forum posts, images and profiles.
//
// An item enters as `Received`, passes triage, ML scoring and (if needed)
// escalation, and leaves as exactly one Decision handed to the sink. The
// ledger makes redelivery of an already-decided item a pure re-emit.

pub mod ingress;
pub mod ledger;
pub mod orchestrator;
pub mod state;

pub use ingress::{Acknowledgment, Delivery};
pub use ledger::{DecisionLedger, LedgerEntry};
pub use orchestrator::{IngressStats, Orchestrator, OrchestratorBuilder, OrchestratorPolicy};
pub use state::PipelineState;
