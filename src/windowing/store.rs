// User and channel window stores for the chat flow.
//
// Reads that derive adaptive state (the channel baseline) take the entry's
// write lock; everything else is a short critical section over fixed-size
// counters. Nothing here awaits.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{ModerationError, ModerationResult};
use crate::models::{ChannelWindowState, UserWindowState};

use super::buckets::BucketedCounter;
use super::keyed::{KeyedWindows, WindowEntry, WindowSpec};
use super::session::SessionWindow;

/// Window layout, eviction and burst-detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowPolicy {
    pub user_short: WindowSpec,
    pub user_long: WindowSpec,
    pub channel_short: WindowSpec,
    pub channel_long: WindowSpec,
    pub session_gap_secs: i64,
    pub ttl_secs: i64,
    /// Starting baseline for channels nobody configured, in msg/s
    pub default_baseline_rate: f64,
    pub spike_multiplier: f64,
    pub ewma_alpha: f64,
    pub baseline_floor: f64,
    pub raid_min_senders: usize,
    pub spam_wave_repeats: u32,
    pub user_fingerprint_history: usize,
    pub channel_fingerprint_history: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            user_short: WindowSpec::new(1_000, 60),
            user_long: WindowSpec::new(5_000, 60),
            channel_short: WindowSpec::new(100, 10),
            channel_long: WindowSpec::new(1_000, 60),
            session_gap_secs: 30,
            ttl_secs: 24 * 60 * 60,
            default_baseline_rate: 2.0,
            spike_multiplier: 5.0,
            ewma_alpha: 0.1,
            baseline_floor: 1.0,
            raid_min_senders: 5,
            spam_wave_repeats: 10,
            user_fingerprint_history: 32,
            channel_fingerprint_history: 256,
        }
    }
}

impl WindowPolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        for (name, spec) in [
            ("user_short", self.user_short),
            ("user_long", self.user_long),
            ("channel_short", self.channel_short),
            ("channel_long", self.channel_long),
        ] {
            if spec.buckets == 0 || spec.bucket_millis == 0 {
                return Err(ModerationError::InvalidConfig(format!(
                    "window {name} must have at least one non-empty bucket"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.ewma_alpha) {
            return Err(ModerationError::InvalidConfig(format!(
                "ewma_alpha must be within [0, 1], got {}",
                self.ewma_alpha
            )));
        }
        if self.spike_multiplier <= 0.0 || self.default_baseline_rate < 0.0 {
            return Err(ModerationError::InvalidConfig(
                "spike_multiplier must be positive and baseline non-negative".to_string(),
            ));
        }
        if self.ttl_secs <= 0 || self.session_gap_secs <= 0 {
            return Err(ModerationError::InvalidConfig(
                "ttl_secs and session_gap_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs)
    }
}

struct UserEntry {
    short: BucketedCounter,
    long: BucketedCounter,
    session: SessionWindow,
    /// (event time, fingerprint), oldest first
    recent: VecDeque<(DateTime<Utc>, u64)>,
    last_message_at: Option<DateTime<Utc>>,
    last_touched: DateTime<Utc>,
}

impl WindowEntry for UserEntry {
    fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }
}

struct ChannelEntry {
    short: BucketedCounter,
    long: BucketedCounter,
    baseline: f64,
    multiplier: f64,
    /// Floor set by `configure_channel`; the adaptive baseline never drops below it
    pinned_baseline: Option<f64>,
    baseline_folded_at: Option<DateTime<Utc>>,
    burst_since: Option<DateTime<Utc>>,
    /// sender -> latest event time inside the short window
    senders: HashMap<String, DateTime<Utc>>,
    recent: VecDeque<(DateTime<Utc>, u64)>,
    first_event_at: Option<DateTime<Utc>>,
    last_event_at: Option<DateTime<Utc>>,
    last_touched: DateTime<Utc>,
}

impl ChannelEntry {
    /// Long-window rate measured over the part of the window the channel
    /// has actually been observed, never shorter than the short window.
    fn observed_rate(&self, now: DateTime<Utc>, short_span: chrono::Duration, long_span: chrono::Duration) -> f64 {
        let observed = self
            .first_event_at
            .map_or(short_span, |first| now - first)
            .clamp(short_span, long_span);
        let secs = observed.num_milliseconds() as f64 / 1_000.0;
        if secs > 0.0 {
            self.long.count_at(now) as f64 / secs
        } else {
            0.0
        }
    }
}

impl WindowEntry for ChannelEntry {
    fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }
}

pub struct WindowedStore {
    policy: WindowPolicy,
    users: KeyedWindows<UserEntry>,
    channels: KeyedWindows<ChannelEntry>,
    clock: Arc<dyn Clock>,
}

impl WindowedStore {
    pub fn new(policy: WindowPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            users: KeyedWindows::new(),
            channels: KeyedWindows::new(),
            clock,
        }
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Wall time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn new_user(&self) -> UserEntry {
        UserEntry {
            short: self.policy.user_short.counter(),
            long: self.policy.user_long.counter(),
            session: SessionWindow::new(chrono::Duration::seconds(self.policy.session_gap_secs)),
            recent: VecDeque::new(),
            last_message_at: None,
            last_touched: self.clock.now(),
        }
    }

    fn new_channel(&self) -> ChannelEntry {
        ChannelEntry {
            short: self.policy.channel_short.counter(),
            long: self.policy.channel_long.counter(),
            baseline: self.policy.default_baseline_rate,
            multiplier: self.policy.spike_multiplier,
            pinned_baseline: None,
            baseline_folded_at: None,
            burst_since: None,
            senders: HashMap::new(),
            recent: VecDeque::new(),
            first_event_at: None,
            last_event_at: None,
            last_touched: self.clock.now(),
        }
    }

    // --- Users ---

    /// Record one message from `user_id` at event time `t`.
    pub fn record_user(&self, user_id: &str, t: DateTime<Utc>, fingerprint: Option<u64>) -> UserWindowState {
        let now = self.clock.now();
        let history = self.policy.user_fingerprint_history;
        let long_span = self.policy.user_long.span();
        self.users.update(user_id, || self.new_user(), |entry| {
            entry.short.record_at(t, 1);
            entry.long.record_at(t, 1);
            entry.session.record(t);
            if let Some(fp) = fingerprint {
                entry.recent.push_back((t, fp));
                while entry.recent.len() > history {
                    entry.recent.pop_front();
                }
            }
            entry.last_message_at = Some(entry.last_message_at.map_or(t, |last| last.max(t)));
            entry.last_touched = entry.last_touched.max(now);
            user_state(user_id, entry, t, fingerprint, long_span)
        })
    }

    /// Current counters for `user_id`; `repeat_count` refers to the most
    /// recently recorded fingerprint.
    pub fn snapshot_user(&self, user_id: &str, now: DateTime<Utc>) -> UserWindowState {
        let long_span = self.policy.user_long.span();
        self.users
            .read(user_id, |entry| {
                let latest = entry.recent.back().map(|(_, fp)| *fp);
                user_state(user_id, entry, now, latest, long_span)
            })
            .unwrap_or_else(|| empty_user(user_id))
    }

    /// Counters for `user_id` with `repeat_count` measured against a
    /// fingerprint that has not been recorded yet.
    pub fn peek_user(&self, user_id: &str, fingerprint: u64, now: DateTime<Utc>) -> UserWindowState {
        let long_span = self.policy.user_long.span();
        self.users
            .read(user_id, |entry| user_state(user_id, entry, now, Some(fingerprint), long_span))
            .unwrap_or_else(|| empty_user(user_id))
    }

    // --- Channels ---

    /// Record one message in `channel_id` from `sender` at event time `t`.
    /// Returns the updated short-window count.
    pub fn record_channel(
        &self,
        channel_id: &str,
        sender: &str,
        t: DateTime<Utc>,
        fingerprint: Option<u64>,
    ) -> u64 {
        let now = self.clock.now();
        let history = self.policy.channel_fingerprint_history;
        self.channels.update(channel_id, || self.new_channel(), |entry| {
            entry.short.record_at(t, 1);
            entry.long.record_at(t, 1);
            let seen = entry.senders.entry(sender.to_owned()).or_insert(t);
            *seen = (*seen).max(t);
            if let Some(fp) = fingerprint {
                entry.recent.push_back((t, fp));
                while entry.recent.len() > history {
                    entry.recent.pop_front();
                }
            }
            entry.first_event_at = Some(entry.first_event_at.map_or(t, |first| first.min(t)));
            entry.last_event_at = Some(entry.last_event_at.map_or(t, |last| last.max(t)));
            entry.last_touched = entry.last_touched.max(now);
            entry.short.count_at(t)
        })
    }

    /// Derive the channel's current rate and flags, then fold the observed
    /// long-window rate into the adaptive baseline.
    ///
    /// The baseline moves at most once per short-window span and holds still
    /// while the channel is bursting, unless the burst has lasted a whole long
    /// window, at which point it is treated as the channel's new normal.
    pub fn snapshot_channel(&self, channel_id: &str, now: DateTime<Utc>) -> ChannelWindowState {
        let policy = &self.policy;
        let short_span = chrono::Duration::milliseconds(policy.channel_short.span().as_millis() as i64);
        let long_span = chrono::Duration::milliseconds(policy.channel_long.span().as_millis() as i64);

        let state = self.channels.update_existing(channel_id, |entry| {
            let short_count = entry.short.count_at(now);
            let long_count = entry.long.count_at(now);
            let rate = entry.short.rate_at(now);
            let baseline = entry.baseline;
            let threshold = baseline * entry.multiplier;
            let burst = rate > threshold;
            entry.burst_since = if burst {
                Some(entry.burst_since.map_or(now, |since| since.min(now)))
            } else {
                None
            };
            let sustained = entry.burst_since.is_some_and(|since| now - since >= long_span);

            entry.senders.retain(|_, last| now - *last < short_span);
            let distinct_senders = entry.senders.len();

            let mut repeats: HashMap<u64, u32> = HashMap::new();
            for (t, fp) in &entry.recent {
                if now - *t < long_span {
                    *repeats.entry(*fp).or_default() += 1;
                }
            }
            let max_repeat = repeats.values().copied().max().unwrap_or(0);

            let due = entry.baseline_folded_at.map_or(true, |last| now - last >= short_span);
            if due && (!burst || sustained) {
                let observed = entry.observed_rate(now, short_span, long_span);
                let updated = (1.0 - policy.ewma_alpha) * entry.baseline + policy.ewma_alpha * observed;
                let floor = entry.pinned_baseline.unwrap_or(0.0).max(policy.baseline_floor);
                entry.baseline = updated.max(floor);
                entry.baseline_folded_at = Some(now);
            }

            ChannelWindowState {
                channel_id: channel_id.to_owned(),
                short_count,
                long_count,
                rate,
                baseline_rate: baseline,
                spike_multiplier: entry.multiplier,
                spike_threshold: threshold,
                distinct_senders,
                burst_detected: burst,
                raid_detected: burst && distinct_senders >= policy.raid_min_senders,
                spam_wave_detected: max_repeat >= policy.spam_wave_repeats,
                last_event_at: entry.last_event_at,
            }
        });

        if let Some(state) = &state {
            if state.burst_detected {
                debug!(
                    channel = channel_id,
                    rate = state.rate,
                    threshold = state.spike_threshold,
                    senders = state.distinct_senders,
                    "Channel burst"
                );
            }
        }

        state.unwrap_or_else(|| ChannelWindowState {
            channel_id: channel_id.to_owned(),
            short_count: 0,
            long_count: 0,
            rate: 0.0,
            baseline_rate: policy.default_baseline_rate,
            spike_multiplier: policy.spike_multiplier,
            spike_threshold: policy.default_baseline_rate * policy.spike_multiplier,
            distinct_senders: 0,
            burst_detected: false,
            raid_detected: false,
            spam_wave_detected: false,
            last_event_at: None,
        })
    }

    /// Pin a channel's baseline rate (msg/s) and spike multiplier.
    pub fn configure_channel(&self, channel_id: &str, baseline_rate: f64, spike_multiplier: f64) {
        let floor = self.policy.baseline_floor;
        self.channels.update(channel_id, || self.new_channel(), |entry| {
            entry.baseline = baseline_rate.max(floor);
            entry.pinned_baseline = Some(entry.baseline);
            entry.multiplier = spike_multiplier;
        });
    }

    // --- Eviction ---

    /// Reclaim every user and channel not touched since `older_than`.
    pub fn evict(&self, older_than: DateTime<Utc>) -> usize {
        let removed = self.users.evict(older_than) + self.channels.evict(older_than);
        if removed > 0 {
            debug!(removed, "Evicted idle window state");
        }
        removed
    }

    /// Evict using the configured TTL relative to the store's clock.
    pub fn evict_expired(&self) -> usize {
        self.evict(self.clock.now() - self.policy.ttl())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.user_count() + self.channel_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn user_state(
    user_id: &str,
    entry: &UserEntry,
    now: DateTime<Utc>,
    fingerprint: Option<u64>,
    long_span: std::time::Duration,
) -> UserWindowState {
    let long_span = chrono::Duration::milliseconds(long_span.as_millis() as i64);
    let repeat_count = fingerprint.map_or(0, |fp| {
        entry
            .recent
            .iter()
            .filter(|(t, seen)| *seen == fp && now - *t < long_span)
            .count() as u32
    });

    UserWindowState {
        user_id: user_id.to_owned(),
        count_1m: entry.short.count_at(now),
        count_5m: entry.long.count_at(now),
        session_count: entry.session.count(now),
        session_started_at: entry.session.started_at(now),
        repeat_count,
        last_message_at: entry.last_message_at,
    }
}

fn empty_user(user_id: &str) -> UserWindowState {
    UserWindowState {
        user_id: user_id.to_owned(),
        count_1m: 0,
        count_5m: 0,
        session_count: 0,
        session_started_at: None,
        repeat_count: 0,
        last_message_at: None,
    }
}
