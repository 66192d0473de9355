// Per-key state map shared by the user and channel stores.
//
// Each key's state sits behind its own DashMap entry, so updates for one key
// are serialized while other keys proceed on other shards. Closures passed to
// `update` run with the entry locked and must not block or await.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::buckets::BucketedCounter;

/// State that can be reclaimed once it goes untouched for a while.
pub trait WindowEntry: Send + Sync {
    fn last_touched(&self) -> DateTime<Utc>;
}

pub struct KeyedWindows<S> {
    entries: DashMap<String, S>,
}

impl<S: WindowEntry> Default for KeyedWindows<S> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<S: WindowEntry> KeyedWindows<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` against the key's state, creating it with `init` first if
    /// the key is new.
    pub fn update<R>(&self, key: &str, init: impl FnOnce() -> S, apply: impl FnOnce(&mut S) -> R) -> R {
        if let Some(mut existing) = self.entries.get_mut(key) {
            return apply(existing.value_mut());
        }
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(init);
        apply(entry.value_mut())
    }

    /// Like `update`, but does nothing for unknown keys.
    pub fn update_existing<R>(&self, key: &str, apply: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.entries.get_mut(key).map(|mut e| apply(e.value_mut()))
    }

    pub fn read<R>(&self, key: &str, read: impl FnOnce(&S) -> R) -> Option<R> {
        self.entries.get(key).map(|e| read(e.value()))
    }

    /// Drop every key not touched since `older_than`. Returns how many went.
    pub fn evict(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, state| state.last_touched() >= older_than);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bucket layout for one window: `buckets` sub-intervals of `bucket_millis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub bucket_millis: u64,
    pub buckets: usize,
}

impl WindowSpec {
    pub const fn new(bucket_millis: u64, buckets: usize) -> Self {
        Self {
            bucket_millis,
            buckets,
        }
    }

    pub fn span(&self) -> Duration {
        Duration::from_millis(self.bucket_millis * self.buckets as u64)
    }

    pub fn counter(&self) -> BucketedCounter {
        BucketedCounter::new(Duration::from_millis(self.bucket_millis), self.buckets)
    }
}

/// A plain set of rolling counters for one key.
#[derive(Debug, Clone)]
pub struct RollingCounts {
    counters: Vec<BucketedCounter>,
    last_touched: DateTime<Utc>,
}

impl WindowEntry for RollingCounts {
    fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }
}

/// Keyed rolling counters with one count per configured window, e.g. the
/// per-author submission rate used by triage.
pub struct KeyedCounters {
    specs: Vec<WindowSpec>,
    windows: KeyedWindows<RollingCounts>,
}

impl KeyedCounters {
    pub fn new(specs: Vec<WindowSpec>) -> Self {
        Self {
            specs,
            windows: KeyedWindows::new(),
        }
    }

    /// Count one event for `key` at `t` and return the updated count per window.
    pub fn record(&self, key: &str, t: DateTime<Utc>) -> Vec<u64> {
        self.windows.update(
            key,
            || RollingCounts {
                counters: self.specs.iter().map(WindowSpec::counter).collect(),
                last_touched: t,
            },
            |state| {
                state.last_touched = state.last_touched.max(t);
                state
                    .counters
                    .iter_mut()
                    .map(|c| {
                        c.record_at(t, 1);
                        c.count_at(t)
                    })
                    .collect()
            },
        )
    }

    /// Current count per window; zeros for unknown keys.
    pub fn snapshot(&self, key: &str, now: DateTime<Utc>) -> Vec<u64> {
        self.windows
            .read(key, |state| state.counters.iter().map(|c| c.count_at(now)).collect())
            .unwrap_or_else(|| vec![0; self.specs.len()])
    }

    pub fn evict(&self, older_than: DateTime<Utc>) -> usize {
        self.windows.evict(older_than)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_counters_track_keys_independently() {
        let counters = KeyedCounters::new(vec![WindowSpec::new(1_000, 60)]);
        let t = Utc::now();
        counters.record("alice", t);
        counters.record("alice", t);
        counters.record("bob", t);
        assert_eq!(counters.snapshot("alice", t), vec![2]);
        assert_eq!(counters.snapshot("bob", t), vec![1]);
        assert_eq!(counters.snapshot("carol", t), vec![0]);
    }

    #[test]
    fn evict_reclaims_idle_keys() {
        let counters = KeyedCounters::new(vec![WindowSpec::new(1_000, 60)]);
        let t = Utc::now();
        counters.record("old", t - chrono::Duration::hours(25));
        counters.record("fresh", t);
        assert_eq!(counters.evict(t - chrono::Duration::hours(24)), 1);
        assert_eq!(counters.len(), 1);
    }
}
