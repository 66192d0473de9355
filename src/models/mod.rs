// Data models — the types that flow through both moderation flows.
//
// These are kept separate from the tiers and stores so every module (and
// the storage sink) can use them without depending on each other.

pub mod chat;
pub mod content;
pub mod decision;
pub mod reputation;
pub mod review;
pub mod scores;
pub mod window;

pub use chat::{ChatMessage, RealtimeDecision, RealtimeFlags, RealtimeVerdict};
pub use content::{ContentItem, ContentKind};
pub use decision::{Decision, DecisionKind, EscalationReason, ProcessingTier, Severity};
pub use reputation::{ReputationRecord, RiskTier, Sanction};
pub use review::{AssignmentState, ReviewAction, ReviewOutcome, ReviewPriority, ReviewTask, ReviewVerdict};
pub use scores::{Dimension, ScoreSet};
pub use window::{ChannelWindowState, UserWindowState};
