// Unit tests for the reputation store.
//
// Penalties scale with severity and shrink with account age, recovery only
// starts after a streak of approvals, repeat offenders collect sanctions,
// and concurrent updates for the same author are never lost.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentinel::clock::{Clock, ManualClock};
use sentinel::models::{Decision, DecisionKind, Dimension, ProcessingTier, RiskTier, Severity};
use sentinel::reputation::{ReputationPolicy, ReputationStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn store() -> ReputationStore {
    ReputationStore::new(ReputationPolicy::default(), Arc::new(ManualClock::new(t0()))).unwrap()
}

fn decision(user: &str, kind: DecisionKind, severity: Severity, at: DateTime<Utc>) -> Decision {
    Decision {
        content_id: format!("{user}-{}", at.timestamp_millis()),
        author_id: user.to_string(),
        kind,
        violations: BTreeSet::new(),
        severity,
        combined_risk: 0.0,
        confidence: 1.0,
        tier: ProcessingTier::MachineLearning,
        processing_time: StdDuration::from_millis(5),
        decided_at: at,
        review_task_id: None,
        escalation_reason: None,
        routing_path: Vec::new(),
        notes: Vec::new(),
    }
}

fn reject(user: &str, severity: Severity, at: DateTime<Utc>) -> Decision {
    decision(user, DecisionKind::Rejected, severity, at)
}

fn approve(user: &str, at: DateTime<Utc>) -> Decision {
    decision(user, DecisionKind::Approved, Severity::None, at)
}

// ============================================================
// Defaults
// ============================================================

#[test]
fn new_user_starts_on_watch() {
    let store = store();
    assert!(store.peek("u1").is_none());

    let record = store.get("u1");
    assert_eq!(record.score, 50.0);
    assert_eq!(record.tier, RiskTier::Watch);
    assert_eq!(record.violations_total, 0);
    assert!(store.peek("u1").is_some());
    assert_eq!(store.len(), 1);
}

// ============================================================
// Penalties
// ============================================================

#[test]
fn rejection_on_new_account_costs_full_penalty() {
    let store = store();
    let record = store.apply_outcome("u1", &reject("u1", Severity::Medium, t0())).unwrap();

    assert!((record.score - 42.0).abs() < 1e-9, "Expected 42, got {}", record.score);
    assert_eq!(record.violations_total, 1);
    assert_eq!(record.violations_7d, 1);
    assert_eq!(record.last_violation, Some(t0()));
    assert_eq!(record.tier, RiskTier::Watch);
}

#[test]
fn older_accounts_pay_less() {
    let store = store();
    // First sighting pins first_seen
    store
        .apply_outcome("u1", &decision("u1", DecisionKind::Escalated, Severity::None, t0()))
        .unwrap();

    let later = t0() + Duration::days(365);
    let record = store.apply_outcome("u1", &reject("u1", Severity::Medium, later)).unwrap();
    let paid = 50.0 - record.score;
    assert!(paid > 4.0 && paid < 8.0, "Expected a reduced penalty, paid {paid}");
}

#[test]
fn critical_rejections_ban_and_clamp_at_zero() {
    let store = store();
    let first = store.apply_outcome("u1", &reject("u1", Severity::Critical, t0())).unwrap();
    assert!((first.score - 26.0).abs() < 1e-9);
    // Score alone would be Restricted; the critical violation bans
    assert_eq!(first.tier, RiskTier::Banned);
    assert_eq!(first.sanctions.len(), 1);
    assert_eq!(first.sanctions[0].until, None);

    store
        .apply_outcome("u1", &reject("u1", Severity::Critical, t0() + Duration::minutes(1)))
        .unwrap();
    let third = store
        .apply_outcome("u1", &reject("u1", Severity::Critical, t0() + Duration::minutes(2)))
        .unwrap();
    assert_eq!(third.score, 0.0);
    assert_eq!(third.tier, RiskTier::Banned);
}

#[test]
fn escalations_leave_score_alone() {
    let store = store();
    let record = store
        .apply_outcome("u1", &decision("u1", DecisionKind::Escalated, Severity::High, t0()))
        .unwrap();
    assert_eq!(record.score, 50.0);
    assert_eq!(record.violations_total, 0);
}

#[test]
fn rolling_counts_split_week_and_month() {
    let store = store();
    store.apply_outcome("u1", &reject("u1", Severity::Low, t0())).unwrap();
    let record = store
        .apply_outcome("u1", &reject("u1", Severity::Low, t0() + Duration::days(10)))
        .unwrap();

    assert_eq!(record.violations_7d, 1);
    assert_eq!(record.violations_30d, 2);
    assert_eq!(record.violations_total, 2);
}

// ============================================================
// Recovery
// ============================================================

#[test]
fn recovery_waits_for_approval_streak() {
    let store = store();
    store.apply_outcome("u1", &reject("u1", Severity::Medium, t0())).unwrap();

    let later = t0() + Duration::days(30);
    for i in 0..4 {
        let record = store
            .apply_outcome("u1", &approve("u1", later + Duration::minutes(i)))
            .unwrap();
        assert!((record.score - 42.0).abs() < 1e-9, "No recovery before the streak");
    }

    let fifth = store
        .apply_outcome("u1", &approve("u1", later + Duration::minutes(4)))
        .unwrap();
    assert_eq!(fifth.consecutive_approvals, 5);
    assert!(
        fifth.score > 42.0 && fifth.score < 43.0,
        "Expected partial recovery, got {}",
        fifth.score
    );
}

#[test]
fn rejection_resets_the_streak() {
    let store = store();
    for i in 0..3 {
        store.apply_outcome("u1", &approve("u1", t0() + Duration::minutes(i))).unwrap();
    }
    let record = store
        .apply_outcome("u1", &reject("u1", Severity::Low, t0() + Duration::minutes(5)))
        .unwrap();
    assert_eq!(record.consecutive_approvals, 0);
}

#[test]
fn score_never_exceeds_one_hundred() {
    let policy = ReputationPolicy {
        initial_score: 99.5,
        ..ReputationPolicy::default()
    };
    let store = ReputationStore::new(policy, Arc::new(ManualClock::new(t0()))).unwrap();
    let mut last = None;
    for i in 0..10 {
        last = Some(store.apply_outcome("u1", &approve("u1", t0() + Duration::minutes(i))).unwrap());
    }
    let record = last.unwrap();
    assert_eq!(record.score, 100.0);
    assert_eq!(record.tier, RiskTier::Normal);
}

// ============================================================
// Concurrency and replay
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_for_one_user_are_all_applied() {
    let store = Arc::new(store());
    let mut handles = Vec::new();
    for i in 0..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let at = t0() + Duration::milliseconds(i);
            store.apply_outcome("shared", &reject("shared", Severity::Low, at)).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Ten low-severity penalties of 4 on a new account
    let record = store.get("shared");
    assert_eq!(record.violations_total, 10);
    assert!((record.score - 10.0).abs() < 1e-9, "Expected 10, got {}", record.score);
    // Ten violations in a month is past the ban threshold
    assert_eq!(record.tier, RiskTier::Banned);
}

#[test]
fn replaying_decisions_gives_the_same_record() {
    let history = vec![
        reject("u1", Severity::High, t0()),
        approve("u1", t0() + Duration::days(1)),
        reject("u1", Severity::Low, t0() + Duration::days(2)),
        approve("u1", t0() + Duration::days(3)),
    ];

    let a = store();
    let b = ReputationStore::new(
        ReputationPolicy::default(),
        Arc::new(ManualClock::new(t0() + Duration::days(40))),
    )
    .unwrap();

    let mut ra = None;
    let mut rb = None;
    for d in &history {
        ra = Some(a.apply_outcome("u1", d).unwrap());
        rb = Some(b.apply_outcome("u1", d).unwrap());
    }
    let (ra, rb) = (ra.unwrap(), rb.unwrap());
    assert_eq!(ra.score, rb.score);
    assert_eq!(ra.tier, rb.tier);
    assert_eq!(ra.violations_total, rb.violations_total);
    assert_eq!(ra.last_violation, rb.last_violation);
}

#[test]
fn account_age_does_not_depend_on_replay_order() {
    let early = reject("u1", Severity::Medium, t0());
    let late = reject("u1", Severity::Medium, t0() + Duration::days(90));

    let forward = store();
    let backward = store();
    for s in [&forward, &backward] {
        s.observe("u1", t0());
    }
    forward.apply_outcome("u1", &early).unwrap();
    let a = forward.apply_outcome("u1", &late).unwrap();
    backward.apply_outcome("u1", &late).unwrap();
    let b = backward.apply_outcome("u1", &early).unwrap();

    assert_eq!(a.first_seen, t0());
    assert_eq!(b.first_seen, t0());
    assert!((a.score - b.score).abs() < 1e-9, "Forward {} vs backward {}", a.score, b.score);
}

#[test]
fn observe_keeps_the_earliest_sighting() {
    let store = store();
    store.observe("u1", t0() + Duration::days(3));
    let record = store.observe("u1", t0());
    assert_eq!(record.first_seen, t0());
    assert_eq!(store.observe("u1", t0() + Duration::days(5)).first_seen, t0());
}

// ============================================================
// Sanctions
// ============================================================

fn trusted_store(clock: &Arc<ManualClock>) -> ReputationStore {
    let policy = ReputationPolicy {
        initial_score: 90.0,
        ..ReputationPolicy::default()
    };
    ReputationStore::new(policy, Arc::clone(clock) as Arc<dyn Clock>).unwrap()
}

#[test]
fn repeat_offences_climb_the_sanction_ladder_and_expire() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = trusted_store(&clock);

    let first = store.apply_outcome("u1", &reject("u1", Severity::Low, t0())).unwrap();
    assert_eq!(first.tier, RiskTier::Normal);
    assert!(first.sanctions.is_empty());

    let second = store
        .apply_outcome("u1", &reject("u1", Severity::Low, t0() + Duration::minutes(1)))
        .unwrap();
    assert_eq!(second.tier, RiskTier::Watch, "Score {} is still Normal by band", second.score);

    let third = store
        .apply_outcome("u1", &reject("u1", Severity::Low, t0() + Duration::minutes(2)))
        .unwrap();
    assert_eq!(third.tier, RiskTier::Restricted);

    // The 24h restriction lapses; the 30 day watch still holds
    clock.advance(Duration::hours(25));
    assert_eq!(store.get("u1").tier, RiskTier::Watch);

    clock.advance(Duration::days(31));
    let record = store.get("u1");
    assert_eq!(record.tier, RiskTier::Normal, "All sanctions expired, score {}", record.score);
}

#[test]
fn five_violations_in_a_month_ban_for_a_month() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = trusted_store(&clock);
    let mut last = None;
    for i in 0..5 {
        last = Some(
            store
                .apply_outcome("u1", &reject("u1", Severity::Low, t0() + Duration::days(i)))
                .unwrap(),
        );
    }
    let record = last.unwrap();
    assert_eq!(record.tier, RiskTier::Banned);
    let ban = record.sanctions.iter().find(|s| s.tier == RiskTier::Banned).unwrap();
    assert_eq!(ban.until, Some(t0() + Duration::days(4) + Duration::days(30)));
}

#[test]
fn threat_violation_bans_at_any_severity() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = trusted_store(&clock);
    let mut decision = reject("u1", Severity::Low, t0());
    decision.violations = BTreeSet::from([Dimension::THREAT]);

    let record = store.apply_outcome("u1", &decision).unwrap();
    assert!(record.score > 80.0);
    assert_eq!(record.tier, RiskTier::Banned);
    assert!(record.sanctions[0].reason.contains("threat"), "{:?}", record.sanctions);
}

#[test]
fn disabled_sanctions_leave_the_band_tier() {
    let mut policy = ReputationPolicy::default();
    policy.sanctions.enabled = false;
    let store = ReputationStore::new(policy, Arc::new(ManualClock::new(t0()))).unwrap();
    let record = store.apply_outcome("u1", &reject("u1", Severity::Critical, t0())).unwrap();
    assert_eq!(record.tier, RiskTier::Restricted);
    assert!(record.sanctions.is_empty());
}

#[test]
fn invalid_policy_is_rejected() {
    let policy = ReputationPolicy {
        max_update_attempts: 0,
        ..ReputationPolicy::default()
    };
    assert!(ReputationStore::new(policy, Arc::new(ManualClock::new(t0()))).is_err());
}
