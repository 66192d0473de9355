// Sentinel: tiered content moderation and real-time chat decisions
//
// This is the library root. Each module corresponds to a major subsystem:
// the content pipeline (triage, ML scoring, escalation to human review)
// and the chat flow (windowed counters plus a per-message decision within
// a few milliseconds), sharing models, scoring adapters and reputation.

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod realtime;
pub mod reputation;
pub mod scoring;
pub mod simulation;
pub mod sink;
pub mod tiers;
pub mod windowing;
