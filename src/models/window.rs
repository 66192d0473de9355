use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one channel's rolling counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelWindowState {
    pub channel_id: String,
    /// Messages in the short window
    pub short_count: u64,
    /// Messages in the long window
    pub long_count: u64,
    /// Short-window rate in messages per second
    pub rate: f64,
    /// Adaptive baseline rate in messages per second
    pub baseline_rate: f64,
    pub spike_multiplier: f64,
    /// `baseline_rate * spike_multiplier`
    pub spike_threshold: f64,
    pub distinct_senders: usize,
    pub burst_detected: bool,
    pub raid_detected: bool,
    pub spam_wave_detected: bool,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Snapshot of one user's rolling counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWindowState {
    pub user_id: String,
    pub count_1m: u64,
    pub count_5m: u64,
    /// Messages in the current session (resets after the inactivity gap)
    pub session_count: u64,
    pub session_started_at: Option<DateTime<Utc>>,
    /// How often the most recent fingerprint appears in the recent set
    pub repeat_count: u32,
    pub last_message_at: Option<DateTime<Utc>>,
}
