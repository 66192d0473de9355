// Unit tests for the windowed state store.
//
// Covers per-user counters and repeat detection, channel burst / raid /
// spam-wave flags, the adaptive baseline, and TTL eviction. Event times are
// explicit so nothing here depends on wall-clock timing.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentinel::clock::ManualClock;
use sentinel::windowing::{BucketedCounter, KeyedCounters, WindowPolicy, WindowSpec, WindowedStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn store() -> (WindowedStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    (WindowedStore::new(WindowPolicy::default(), clock.clone()), clock)
}

// ============================================================
// BucketedCounter
// ============================================================

#[test]
fn counter_forgets_events_older_than_window() {
    let mut counter = BucketedCounter::new(std::time::Duration::from_secs(1), 60);
    counter.record_at(t0(), 3);
    counter.record_at(t0() + Duration::seconds(30), 2);

    assert_eq!(counter.count_at(t0() + Duration::seconds(30)), 5);
    assert_eq!(counter.count_at(t0() + Duration::seconds(75)), 2);
    assert_eq!(counter.count_at(t0() + Duration::seconds(120)), 0);
    assert_eq!(counter.total(), 5);
}

#[test]
fn counter_drops_events_the_ring_can_no_longer_hold() {
    let mut counter = BucketedCounter::new(std::time::Duration::from_secs(1), 10);
    assert!(counter.record_at(t0() + Duration::seconds(20), 1));
    // Same slot, ten buckets earlier
    assert!(!counter.record_at(t0() + Duration::seconds(10), 1));
    assert_eq!(counter.total(), 1);
}

#[test]
fn keyed_counters_track_keys_independently() {
    let counters = KeyedCounters::new(vec![WindowSpec::new(1_000, 60)]);
    for i in 0..4 {
        counters.record("alice", t0() + Duration::seconds(i));
    }
    counters.record("bob", t0());

    assert_eq!(counters.snapshot("alice", t0() + Duration::seconds(5)), vec![4]);
    assert_eq!(counters.snapshot("bob", t0() + Duration::seconds(5)), vec![1]);
    assert_eq!(counters.snapshot("carol", t0()), vec![0]);
    assert_eq!(counters.len(), 2);
}

// ============================================================
// Users
// ============================================================

#[test]
fn user_counts_split_between_one_and_five_minutes() {
    let (store, _) = store();
    for i in 0..3 {
        store.record_user("u1", t0() + Duration::seconds(i * 10), None);
    }
    for i in 0..2 {
        store.record_user("u1", t0() + Duration::seconds(150 + i), None);
    }

    let state = store.snapshot_user("u1", t0() + Duration::seconds(160));
    assert_eq!(state.count_1m, 2);
    assert_eq!(state.count_5m, 5);
}

#[test]
fn peek_counts_prior_copies_of_a_message() {
    let (store, _) = store();
    let fp = 0xfeed_u64;
    store.record_user("u1", t0(), Some(fp));
    store.record_user("u1", t0() + Duration::seconds(1), Some(0xbeef));
    store.record_user("u1", t0() + Duration::seconds(2), Some(fp));

    let now = t0() + Duration::seconds(3);
    assert_eq!(store.peek_user("u1", fp, now).repeat_count, 2);
    assert_eq!(store.peek_user("u1", 0x1234, now).repeat_count, 0);
    // Unknown user
    assert_eq!(store.peek_user("nobody", fp, now).count_1m, 0);
}

#[test]
fn session_resets_after_inactivity_gap() {
    let (store, _) = store();
    store.record_user("u1", t0(), None);
    store.record_user("u1", t0() + Duration::seconds(10), None);
    // Default gap is 30s
    store.record_user("u1", t0() + Duration::seconds(60), None);

    let state = store.snapshot_user("u1", t0() + Duration::seconds(61));
    assert_eq!(state.session_count, 1);
    assert_eq!(state.session_started_at, Some(t0() + Duration::seconds(60)));
}

// ============================================================
// Channels
// ============================================================

#[test]
fn burst_when_short_rate_exceeds_pinned_baseline() {
    let (store, _) = store();
    // 10 msg/s baseline, spike at 5x = 50 msg/s
    store.configure_channel("lobby", 10.0, 5.0);
    for i in 0..60 {
        store.record_channel("lobby", &format!("user-{}", i % 3), t0(), None);
    }

    let state = store.snapshot_channel("lobby", t0());
    assert!(state.burst_detected, "60 msg/s should exceed 50, got rate {}", state.rate);
    assert!((state.spike_threshold - 50.0).abs() < 1e-9);
    // Only three senders: a burst but not a raid
    assert!(!state.raid_detected);
}

#[test]
fn quiet_channel_is_not_bursting() {
    let (store, _) = store();
    store.configure_channel("lobby", 10.0, 5.0);
    for _ in 0..20 {
        store.record_channel("lobby", "u1", t0(), None);
    }
    assert!(!store.snapshot_channel("lobby", t0()).burst_detected);
}

#[test]
fn many_senders_in_a_burst_is_a_raid() {
    let (store, _) = store();
    for i in 0..40 {
        store.record_channel("arena", &format!("raider-{i}"), t0(), None);
    }
    let state = store.snapshot_channel("arena", t0());
    assert!(state.burst_detected);
    assert!(state.raid_detected);
    assert_eq!(state.distinct_senders, 40);
}

#[test]
fn repeated_fingerprint_is_a_spam_wave() {
    let (store, _) = store();
    for i in 0..10 {
        store.record_channel("lobby", &format!("u{i}"), t0() + Duration::seconds(i), Some(42));
    }
    let state = store.snapshot_channel("lobby", t0() + Duration::seconds(10));
    assert!(state.spam_wave_detected);
}

#[test]
fn baseline_adapts_only_outside_bursts() {
    let (store, _) = store();
    store.configure_channel("lobby", 2.0, 10.0);

    // Steady 6 msg/s for 60 seconds, snapshotting every second
    for s in 0..60 {
        let t = t0() + Duration::seconds(s);
        for _ in 0..6 {
            store.record_channel("lobby", "u1", t, None);
        }
        store.snapshot_channel("lobby", t);
    }
    let steady = store.snapshot_channel("lobby", t0() + Duration::seconds(60));
    assert!(
        steady.baseline_rate > 2.0,
        "Expected baseline to climb toward the steady rate, got {}",
        steady.baseline_rate
    );

    // A burst does not drag the baseline up with it
    let burst_at = t0() + Duration::seconds(61);
    for _ in 0..500 {
        store.record_channel("lobby", "u1", burst_at, None);
    }
    let during = store.snapshot_channel("lobby", burst_at);
    let after = store.snapshot_channel("lobby", burst_at);
    assert!(during.burst_detected);
    assert!((after.baseline_rate - during.baseline_rate).abs() < 1e-9);
}

#[test]
fn baseline_folds_once_per_short_window() {
    let (store, _) = store();
    store.configure_channel("lobby", 4.0, 5.0);
    store.record_channel("lobby", "u1", t0(), None);

    // Many snapshots inside the same second move the baseline at most once
    let first = store.snapshot_channel("lobby", t0());
    for _ in 0..200 {
        store.snapshot_channel("lobby", t0());
    }
    let later = store.snapshot_channel("lobby", t0());
    assert!((later.baseline_rate - first.baseline_rate).abs() < 0.5, "Baseline drifted to {}", later.baseline_rate);
    assert!(later.baseline_rate >= 4.0, "Pinned baseline must hold, got {}", later.baseline_rate);
}

#[test]
fn burst_clears_once_traffic_calms_down() {
    let (store, _) = store();
    for i in 0..100 {
        store.record_channel("lobby", &format!("u{i}"), t0(), None);
    }
    assert!(store.snapshot_channel("lobby", t0()).burst_detected);

    for s in 1..=30 {
        let t = t0() + Duration::seconds(s);
        store.record_channel("lobby", "u1", t, None);
        let state = store.snapshot_channel("lobby", t);
        assert!(!state.burst_detected, "Still bursting at {s}s with rate {}", state.rate);
    }
}

#[test]
fn sustained_rate_becomes_the_new_normal() {
    let (store, _) = store();
    // 20 msg/s against the default 2 msg/s x5 threshold
    let mut last = None;
    for s in 0..180 {
        let t = t0() + Duration::seconds(s);
        for i in 0..20 {
            store.record_channel("busy", &format!("u{i}"), t, None);
        }
        last = Some(store.snapshot_channel("busy", t));
        if s == 30 {
            assert!(last.as_ref().unwrap().burst_detected, "A fresh spike is a burst");
        }
    }
    let last = last.unwrap();
    assert!(!last.burst_detected, "Expected adaptation after three minutes, rate {}", last.rate);
    assert!(last.baseline_rate > 4.0, "Got baseline {}", last.baseline_rate);
}

#[test]
fn unknown_channel_reports_defaults() {
    let (store, _) = store();
    let state = store.snapshot_channel("empty", t0());
    assert_eq!(state.short_count, 0);
    assert!(!state.burst_detected);
    assert_eq!(store.channel_count(), 0, "Snapshots must not create state");
}

// ============================================================
// Eviction
// ============================================================

#[test]
fn idle_keys_are_evicted_after_ttl() {
    let (store, clock) = store();
    store.record_user("old", t0(), None);
    store.record_channel("old-channel", "old", t0(), None);

    clock.advance(Duration::hours(23));
    store.record_user("fresh", clock_now(&clock), None);

    clock.advance(Duration::hours(2));
    let removed = store.evict_expired();
    assert_eq!(removed, 2);
    assert_eq!(store.user_count(), 1);
    assert_eq!(store.snapshot_user("old", clock_now(&clock)).count_5m, 0);
}

fn clock_now(clock: &ManualClock) -> DateTime<Utc> {
    use sentinel::clock::Clock;
    clock.now()
}
