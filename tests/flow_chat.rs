// End-to-end tests for the chat flow.
//
// The engine is driven directly with explicit event times for the
// decision rules, and through the partitioned pool for ordering, overload
// and sink hand-off.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::StubAdapter;
use sentinel::clock::{Clock, ManualClock};
use sentinel::error::ModerationError;
use sentinel::metrics::{InMemoryMetrics, MetricsSink};
use sentinel::models::{ChatMessage, Dimension, RealtimeVerdict};
use sentinel::realtime::{PartitionedPool, RealtimeEngine, RealtimePolicy, TimeoutPolicy};
use sentinel::reputation::{ReputationPolicy, ReputationStore};
use sentinel::scoring::{LatencyClass, ScoringAdapter};
use sentinel::sink::{DecisionSink, MemorySink};
use sentinel::tiers::RateLimits;
use sentinel::windowing::{WindowPolicy, WindowedStore};
use tokio::time::Instant;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

fn msg(id: &str, author: &str, channel: &str, text: &str, event_time: DateTime<Utc>) -> ChatMessage {
    ChatMessage::new(id, author, channel, text, event_time)
}

/// Realtime-rated stub scoring toxicity at a fixed value.
fn toxicity(value: f64) -> Arc<StubAdapter> {
    Arc::new(
        StubAdapter::new("fast_lexicon", LatencyClass::Realtime)
            .with_score(Dimension::TOXICITY, value)
            .with_budget(Duration::from_millis(5)),
    )
}

fn slow_adapter() -> Arc<StubAdapter> {
    Arc::new(
        StubAdapter::new("slow_lexicon", LatencyClass::Realtime)
            .with_score(Dimension::TOXICITY, 0.0)
            .with_delay(Duration::from_millis(50)),
    )
}

struct Harness {
    engine: RealtimeEngine,
    store: Arc<WindowedStore>,
    metrics: Arc<InMemoryMetrics>,
}

fn harness(adapters: Vec<Arc<dyn ScoringAdapter>>, policy: RealtimePolicy) -> Harness {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(WindowedStore::new(WindowPolicy::default(), clock));
    let metrics = Arc::new(InMemoryMetrics::new());
    let engine = RealtimeEngine::new(
        Arc::clone(&store),
        adapters,
        policy,
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    Harness { engine, store, metrics }
}

// ============================================================
// Decision rules
// ============================================================

#[tokio::test]
async fn ordinary_message_is_allowed_and_counted() {
    let h = harness(vec![toxicity(0.05)], RealtimePolicy::default());
    let decision = h
        .engine
        .process(&msg("m1", "u1", "lobby", "gg everyone", t0()), Instant::now())
        .await;

    assert_eq!(decision.decision, RealtimeVerdict::Allow);
    assert!(decision.violations.is_empty());
    assert_eq!(decision.user_count_1m, 0, "Counts are read before the message is recorded");
    assert_eq!(h.store.snapshot_user("u1", t0()).count_1m, 1);
    assert_eq!(h.metrics.counter("chat.processed", &[("decision", "allow")]), 1);
    assert!(h.metrics.percentiles("chat.latency").is_some());
}

#[tokio::test]
async fn high_score_blocks() {
    let h = harness(vec![toxicity(0.9)], RealtimePolicy::default());
    let decision = h
        .engine
        .process(&msg("m1", "u1", "lobby", "you absolute clown", t0()), Instant::now())
        .await;

    assert!(decision.is_blocked());
    assert!(decision.violations.contains(&Dimension::TOXICITY));
}

#[tokio::test]
async fn borderline_score_blocks_only_during_a_burst() {
    let h = harness(vec![toxicity(0.5)], RealtimePolicy::default());

    // 10 msg/s baseline, burst above 50 msg/s
    h.store.configure_channel("lobby", 10.0, 5.0);
    for i in 0..60 {
        h.store.record_channel("lobby", &format!("user-{}", i % 3), t0(), None);
    }

    let bursting = h
        .engine
        .process(&msg("m1", "u1", "lobby", "whatever dude", t0()), Instant::now())
        .await;
    assert!(bursting.flags.burst_detected);
    assert!(bursting.is_blocked());

    let quiet = h
        .engine
        .process(&msg("m2", "u2", "library", "whatever dude", t0()), Instant::now())
        .await;
    assert!(!quiet.flags.burst_detected);
    assert_eq!(quiet.decision, RealtimeVerdict::Allow);
}

#[tokio::test]
async fn steady_traffic_below_the_spike_never_bursts() {
    let h = harness(vec![toxicity(0.5)], RealtimePolicy::default());
    h.store.configure_channel("lobby", 10.0, 5.0);

    // Two minutes at 8 msg/s, one message per distinct viewer
    let mut flagged = Vec::new();
    for i in 0..960i64 {
        let t = t0() + chrono::Duration::milliseconds(i * 125);
        let m = msg(&format!("m{i}"), &format!("viewer-{i}"), "lobby", &format!("round {i} was close"), t);
        let decision = h.engine.process(&m, Instant::now()).await;
        if decision.flags.burst_detected || decision.is_blocked() {
            flagged.push(i);
        }
    }
    assert!(flagged.is_empty(), "Expected no bursts at 8 msg/s, got {} flagged from {:?}", flagged.len(), flagged.first());

    let state = h.store.snapshot_channel("lobby", at(120));
    assert!(
        state.baseline_rate >= 10.0,
        "Configured baseline must hold, got {}",
        state.baseline_rate
    );
}

#[tokio::test]
async fn raid_is_flagged() {
    let h = harness(Vec::new(), RealtimePolicy::default());
    for i in 0..40 {
        let m = msg(&format!("r{i}"), &format!("raider-{i}"), "arena", &format!("hello {i}"), t0());
        h.engine.process(&m, Instant::now()).await;
    }
    let decision = h
        .engine
        .process(&msg("m1", "regular", "arena", "what is happening", t0()), Instant::now())
        .await;

    assert!(decision.flags.burst_detected);
    assert!(decision.flags.raid_detected);
    assert!(decision.channel_rate >= 40.0);
}

#[tokio::test]
async fn author_over_rate_limit_is_blocked() {
    let policy = RealtimePolicy {
        rate_limits: RateLimits {
            normal: 5,
            ..RateLimits::default()
        },
        ..RealtimePolicy::default()
    };
    let h = harness(Vec::new(), policy);

    for i in 0..5 {
        let d = h
            .engine
            .process(&msg(&format!("m{i}"), "u1", "lobby", &format!("line {i}"), at(i)), Instant::now())
            .await;
        assert_eq!(d.decision, RealtimeVerdict::Allow, "Message {i} should pass");
    }

    let sixth = h
        .engine
        .process(&msg("m5", "u1", "lobby", "line 5", at(5)), Instant::now())
        .await;
    assert!(sixth.is_rate_limited());
    assert!(sixth.is_blocked());
    assert!(sixth.violations.contains(&Dimension::SPAM));
    assert_eq!(sixth.user_count_1m, 5);

    // A minute later the window has emptied
    let later = h
        .engine
        .process(&msg("m6", "u1", "lobby", "line 6", at(70)), Instant::now())
        .await;
    assert_eq!(later.decision, RealtimeVerdict::Allow);
}

#[tokio::test]
async fn rate_limit_follows_reputation_tier() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
    let reputation = ReputationStore::new(
        ReputationPolicy {
            initial_score: 5.0,
            ..ReputationPolicy::default()
        },
        Arc::clone(&clock),
    )
    .unwrap();
    // Seen before, and banned: limit 0
    reputation.get("banned-user");
    let reputation = Arc::new(reputation);

    let store = Arc::new(WindowedStore::new(WindowPolicy::default(), clock));
    let engine = RealtimeEngine::new(
        store,
        Vec::new(),
        RealtimePolicy::default(),
        Arc::new(InMemoryMetrics::new()) as Arc<dyn MetricsSink>,
    )
    .unwrap()
    .with_reputation(Arc::clone(&reputation));

    let banned = engine
        .process(&msg("m1", "banned-user", "lobby", "hi", t0()), Instant::now())
        .await;
    assert!(banned.is_rate_limited());

    // Unknown authors are treated as normal and not created
    let stranger = engine
        .process(&msg("m2", "stranger", "lobby", "hi", t0()), Instant::now())
        .await;
    assert!(!stranger.is_rate_limited());
    assert!(reputation.peek("stranger").is_none());
}

#[tokio::test]
async fn repeated_message_blocks_on_third_copy() {
    let h = harness(Vec::new(), RealtimePolicy::default());
    let text = "follow my stream";

    let first = h.engine.process(&msg("m1", "u1", "lobby", text, at(0)), Instant::now()).await;
    let second = h.engine.process(&msg("m2", "u1", "lobby", text, at(1)), Instant::now()).await;
    let third = h.engine.process(&msg("m3", "u1", "lobby", text, at(2)), Instant::now()).await;

    assert!(!first.flags.repeat_message);
    assert!(second.flags.repeat_message);
    assert_eq!(second.decision, RealtimeVerdict::Allow);
    assert!(third.is_blocked());
    assert!(third.violations.contains(&Dimension::SPAM));
}

#[tokio::test]
async fn blocklisted_phrase_blocks() {
    let h = harness(Vec::new(), RealtimePolicy::default());
    let decision = h
        .engine
        .process(&msg("m1", "u1", "lobby", "wanna BUY FOLLOWERS?", t0()), Instant::now())
        .await;
    assert!(decision.is_blocked());
    assert!(decision.violations.contains(&Dimension::new("blocklist")));
}

// ============================================================
// Timeouts
// ============================================================

#[tokio::test(start_paused = true)]
async fn late_scores_allow_with_flag_by_default() {
    let h = harness(vec![slow_adapter()], RealtimePolicy::default());
    let decision = h
        .engine
        .process(&msg("m1", "u1", "lobby", "hello", t0()), Instant::now())
        .await;

    assert!(decision.flags.scoring_timeout);
    assert!(!decision.flags.queued_for_review);
    assert_eq!(decision.decision, RealtimeVerdict::Allow);
    assert!(decision.latency < Duration::from_millis(20));
    assert_eq!(h.metrics.counter("adapter.timeout", &[("adapter", "slow_lexicon")]), 1);
}

#[tokio::test(start_paused = true)]
async fn late_scores_block_and_queue_when_configured() {
    let policy = RealtimePolicy {
        timeout_policy: TimeoutPolicy::BlockAndQueue,
        ..RealtimePolicy::default()
    };
    let h = harness(vec![slow_adapter()], policy);
    let decision = h
        .engine
        .process(&msg("m1", "u1", "lobby", "hello", t0()), Instant::now())
        .await;

    assert!(decision.flags.scoring_timeout);
    assert!(decision.flags.queued_for_review);
    assert!(decision.is_blocked());
}

#[tokio::test]
async fn standard_adapters_are_refused() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(WindowedStore::new(WindowPolicy::default(), clock));
    let heavy: Arc<dyn ScoringAdapter> = Arc::new(StubAdapter::new("vision_model", LatencyClass::Standard));

    let result = RealtimeEngine::new(
        store,
        vec![heavy],
        RealtimePolicy::default(),
        Arc::new(InMemoryMetrics::new()) as Arc<dyn MetricsSink>,
    );
    assert!(matches!(result, Err(ModerationError::IneligibleAdapter(name)) if name == "vision_model"));
}

// ============================================================
// Partitioned pool
// ============================================================

#[tokio::test]
async fn pool_keeps_channel_order_and_writes_every_decision() {
    let h = harness(Vec::new(), RealtimePolicy::default());
    let sink = Arc::new(MemorySink::new());
    let pool = PartitionedPool::new(4, Arc::new(h.engine), Arc::clone(&sink) as Arc<dyn DecisionSink>);

    let mut replies = Vec::new();
    for i in 0..5 {
        let m = msg(&format!("m{i}"), "u1", "lobby", "same words again", at(i));
        replies.push(pool.submit(m).await);
    }
    for i in 0..5 {
        let m = msg(&format!("o{i}"), &format!("u{i}"), "other", &format!("hi {i}"), at(i));
        replies.push(pool.submit(m).await);
    }

    let mut decisions = Vec::new();
    for rx in replies {
        decisions.push(rx.await.unwrap().unwrap());
    }
    pool.shutdown().await;

    // Lobby messages are decided in arrival order: copies 3..5 block
    let lobby: Vec<bool> = decisions[..5].iter().map(|d| d.is_blocked()).collect();
    assert_eq!(lobby, vec![false, false, true, true, true]);
    assert!(decisions[5..].iter().all(|d| !d.is_blocked()));
    assert_eq!(sink.realtime_decisions().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn queued_messages_land_in_the_review_sink() {
    let policy = RealtimePolicy {
        timeout_policy: TimeoutPolicy::BlockAndQueue,
        ..RealtimePolicy::default()
    };
    let h = harness(vec![slow_adapter()], policy);
    let sink = Arc::new(MemorySink::new());
    let pool = PartitionedPool::new(1, Arc::new(h.engine), Arc::clone(&sink) as Arc<dyn DecisionSink>);

    let rx = pool.submit(msg("m1", "u1", "lobby", "hello", t0())).await;
    let decision = rx.await.unwrap().unwrap();
    pool.shutdown().await;

    assert!(decision.flags.queued_for_review);
    assert_eq!(sink.chat_reviews().len(), 1);
    assert_eq!(sink.realtime_decision("m1").unwrap().decision, RealtimeVerdict::Block);
}

#[tokio::test(start_paused = true)]
async fn full_partition_gets_the_default_decision() {
    let policy = RealtimePolicy {
        queue_depth: 1,
        enqueue_timeout_ms: 1,
        ..RealtimePolicy::default()
    };
    let h = harness(vec![slow_adapter()], policy);
    let sink = Arc::new(MemorySink::new());
    let pool = PartitionedPool::new(1, Arc::new(h.engine), Arc::clone(&sink) as Arc<dyn DecisionSink>);

    // First is picked up by the worker, second waits in the queue, third
    // finds the queue full.
    let r1 = pool.submit(msg("m1", "u1", "lobby", "one", t0())).await;
    let r2 = pool.submit(msg("m2", "u2", "lobby", "two", t0())).await;
    let r3 = pool.submit(msg("m3", "u3", "lobby", "three", t0())).await;

    let overflow = r3.await.unwrap().unwrap();
    assert!(overflow.flags.deadline_exceeded);
    assert!(!overflow.flags.scoring_timeout);
    assert_eq!(overflow.decision, RealtimeVerdict::Allow);

    assert!(r1.await.unwrap().unwrap().flags.scoring_timeout);
    assert!(r2.await.unwrap().unwrap().flags.scoring_timeout);
    pool.shutdown().await;
    assert_eq!(sink.realtime_decisions().len(), 3);
}
