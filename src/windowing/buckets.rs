// Ring buffer of per-sub-interval counts.
//
// A window of `n` buckets of width `w` covers the trailing `n * w`. Each slot
// remembers which bucket epoch it currently holds, so stale slots are
// detected and reset lazily when they are next touched. Memory per counter is
// fixed no matter how many events arrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    epoch: i64,
    count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketedCounter {
    bucket_millis: i64,
    slots: Vec<Slot>,
    /// Lifetime number of events accepted
    total: u64,
}

impl BucketedCounter {
    /// `bucket_width` below one millisecond is rounded up; zero buckets is
    /// treated as one.
    pub fn new(bucket_width: Duration, buckets: usize) -> Self {
        let bucket_millis = (bucket_width.as_millis() as i64).max(1);
        Self {
            bucket_millis,
            // epoch i64::MIN marks a slot that never held anything
            slots: vec![
                Slot {
                    epoch: i64::MIN,
                    count: 0
                };
                buckets.max(1)
            ],
            total: 0,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis((self.bucket_millis as u64) * self.slots.len() as u64)
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::from_millis(self.bucket_millis as u64)
    }

    pub fn buckets(&self) -> usize {
        self.slots.len()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn epoch_of(&self, t: DateTime<Utc>) -> i64 {
        t.timestamp_millis().div_euclid(self.bucket_millis)
    }

    fn index_of(&self, epoch: i64) -> usize {
        epoch.rem_euclid(self.slots.len() as i64) as usize
    }

    /// Add `n` events at time `t`. Returns false when the event is older
    /// than anything the ring can still represent and was dropped.
    pub fn record_at(&mut self, t: DateTime<Utc>, n: u64) -> bool {
        let epoch = self.epoch_of(t);
        let idx = self.index_of(epoch);
        let slot = &mut self.slots[idx];

        if slot.epoch == epoch {
            slot.count += n;
        } else if slot.epoch < epoch {
            *slot = Slot { epoch, count: n };
        } else {
            // The slot already holds a newer bucket, so `t` fell out of the
            // window relative to events we have seen.
            return false;
        }
        self.total += n;
        true
    }

    /// Events inside the full window ending at `now`.
    pub fn count_at(&self, now: DateTime<Utc>) -> u64 {
        self.sum_recent(now, self.slots.len())
    }

    /// Events inside the most recent `n_buckets` buckets ending at `now`.
    pub fn sum_recent(&self, now: DateTime<Utc>, n_buckets: usize) -> u64 {
        let current = self.epoch_of(now);
        let span = n_buckets.min(self.slots.len()) as i64;
        let oldest = current - span + 1;
        self.slots
            .iter()
            .filter(|s| s.epoch >= oldest && s.epoch <= current)
            .map(|s| s.count)
            .sum()
    }

    /// Events per second over the full window ending at `now`.
    pub fn rate_at(&self, now: DateTime<Utc>) -> f64 {
        let secs = self.window().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.count_at(now) as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn counts_within_window_and_expires() {
        let mut c = BucketedCounter::new(Duration::from_secs(1), 60);
        for i in 0..30 {
            c.record_at(t0() + chrono::Duration::seconds(i), 1);
        }
        assert_eq!(c.count_at(t0() + chrono::Duration::seconds(29)), 30);
        // 40s later the first 10 have left the 60s window
        assert_eq!(c.count_at(t0() + chrono::Duration::seconds(69)), 20);
        assert_eq!(c.count_at(t0() + chrono::Duration::seconds(200)), 0);
        assert_eq!(c.total(), 30);
    }

    #[test]
    fn late_event_beyond_ring_is_dropped() {
        let mut c = BucketedCounter::new(Duration::from_secs(1), 10);
        assert!(c.record_at(t0() + chrono::Duration::seconds(15), 1));
        // same slot index as second 15, but ten buckets older
        assert!(!c.record_at(t0() + chrono::Duration::seconds(5), 1));
        assert_eq!(c.total(), 1);
    }

    #[test]
    fn sum_recent_limits_to_latest_buckets() {
        let mut c = BucketedCounter::new(Duration::from_secs(1), 60);
        c.record_at(t0(), 5);
        c.record_at(t0() + chrono::Duration::seconds(50), 2);
        let now = t0() + chrono::Duration::seconds(50);
        assert_eq!(c.sum_recent(now, 10), 2);
        assert_eq!(c.count_at(now), 7);
    }
}
