use chrono::{DateTime, Duration, Utc};

/// Session-gap window: a session lasts until no event arrives for `gap`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWindow {
    gap: Duration,
    started_at: Option<DateTime<Utc>>,
    last_at: Option<DateTime<Utc>>,
    count: u64,
}

impl SessionWindow {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            started_at: None,
            last_at: None,
            count: 0,
        }
    }

    /// Record an event. Returns true if it opened a new session.
    pub fn record(&mut self, t: DateTime<Utc>) -> bool {
        let opens_session = match self.last_at {
            Some(last) => t - last > self.gap,
            None => true,
        };

        if opens_session {
            self.started_at = Some(t);
            self.count = 0;
        }
        self.count += 1;
        self.last_at = Some(self.last_at.map_or(t, |last| last.max(t)));
        opens_session
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.last_at.is_some_and(|last| now - last <= self.gap)
    }

    /// Events in the current session, or 0 once the gap has elapsed.
    pub fn count(&self, now: DateTime<Utc>) -> u64 {
        if self.is_active(now) {
            self.count
        } else {
            0
        }
    }

    pub fn started_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_active(now) {
            self.started_at
        } else {
            None
        }
    }

    pub fn last_at(&self) -> Option<DateTime<Utc>> {
        self.last_at
    }
}
