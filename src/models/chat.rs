use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scores::Dimension;

/// A live chat event. `event_time` is when the client sent it, which can
/// lag behind the time we process it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author_id: String,
    pub channel_id: String,
    pub text: String,
    pub event_time: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            channel_id: channel_id.into(),
            text: text.into(),
            event_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeVerdict {
    Allow,
    Block,
}

impl RealtimeVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeVerdict::Allow => "allow",
            RealtimeVerdict::Block => "block",
        }
    }
}

impl std::fmt::Display for RealtimeVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeFlags {
    pub rate_limited: bool,
    pub repeat_message: bool,
    pub burst_detected: bool,
    pub raid_detected: bool,
    pub spam_wave_detected: bool,
    pub scoring_timeout: bool,
    pub deadline_exceeded: bool,
    pub queued_for_review: bool,
}

/// Outcome of the chat flow for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeDecision {
    pub message_id: String,
    pub author_id: String,
    pub channel_id: String,
    pub decision: RealtimeVerdict,
    pub violations: BTreeSet<Dimension>,
    /// Highest realtime score seen for the message
    pub score: f64,
    /// Receipt to emission, measured on the monotonic clock
    pub latency: Duration,
    pub flags: RealtimeFlags,
    /// Author's message count in the last minute, before this message
    pub user_count_1m: u64,
    pub user_count_5m: u64,
    /// Channel rate over the short window, in messages per second
    pub channel_rate: f64,
    pub decided_at: DateTime<Utc>,
}

impl RealtimeDecision {
    pub fn is_blocked(&self) -> bool {
        self.decision == RealtimeVerdict::Block
    }

    pub fn is_rate_limited(&self) -> bool {
        self.flags.rate_limited
    }
}
