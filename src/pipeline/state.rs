// Explicit per-item state machine for the content flow.
//
//   Received → Triage → { Terminal | MlScoring } → { Terminal | Escalation } → Terminal
//
// Every non-terminal variant carries exactly what the next tier needs, so a
// transition can't forget the scores accumulated so far.

use crate::models::{Decision, EscalationReason, ScoreSet};
use crate::scoring::Assessment;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Received,
    Triage,
    MlScoring { partial: ScoreSet },
    Escalation { assessment: Assessment, reason: EscalationReason },
    Terminal(Decision),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Terminal(_))
    }

    /// Stage label recorded in a Decision's routing path.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Received => "received",
            PipelineState::Triage => "triage",
            PipelineState::MlScoring { .. } => "ml",
            PipelineState::Escalation { .. } => "escalation",
            PipelineState::Terminal(_) => "terminal",
        }
    }
}
