// Colored terminal output for simulation runs.
//
// main.rs collects decisions and metrics; everything about how they look
// on screen lives here.

use std::collections::BTreeMap;

use colored::Colorize;

use crate::metrics::{InMemoryMetrics, Percentiles};
use crate::models::{Decision, DecisionKind, RealtimeDecision, RealtimeVerdict, ReviewPriority, ReviewTask};
use crate::simulation::Scenario;

/// Per-scenario breakdown of content decisions.
pub fn display_content_summary(results: &[(Scenario, Decision)]) {
    if results.is_empty() {
        println!("No content processed.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Content Decisions ({} items) ===", results.len()).bold()
    );
    println!();
    println!(
        "  {:<12} {:>7} {:>9} {:>9} {:>10}",
        "Scenario".dimmed(),
        "Items".dimmed(),
        "Approved".dimmed(),
        "Rejected".dimmed(),
        "Escalated".dimmed(),
    );
    println!("  {}", "-".repeat(52).dimmed());

    let mut by_scenario: BTreeMap<Scenario, [usize; 3]> = BTreeMap::new();
    for (scenario, decision) in results {
        let row = by_scenario.entry(*scenario).or_default();
        match decision.kind {
            DecisionKind::Approved => row[0] += 1,
            DecisionKind::Rejected => row[1] += 1,
            DecisionKind::Escalated => row[2] += 1,
        }
    }
    for (scenario, [approved, rejected, escalated]) in &by_scenario {
        println!(
            "  {:<12} {:>7} {:>9} {:>9} {:>10}",
            scenario.as_str(),
            approved + rejected + escalated,
            approved.to_string().green(),
            rejected.to_string().red(),
            escalated.to_string().yellow(),
        );
    }

    // Which tier settled each item
    let mut by_tier: BTreeMap<u8, (&str, usize)> = BTreeMap::new();
    for (_, decision) in results {
        by_tier
            .entry(decision.tier.number())
            .or_insert((decision.tier.as_str(), 0))
            .1 += 1;
    }
    println!("\n  Settled by tier:");
    for (number, (name, count)) in &by_tier {
        let share = *count as f64 / results.len() as f64 * 100.0;
        println!("    {number}. {name:<14} {count:>6}  ({share:.1}%)");
    }

    let mut violations: BTreeMap<String, usize> = BTreeMap::new();
    for (_, decision) in results {
        for dimension in &decision.violations {
            *violations.entry(dimension.to_string()).or_default() += 1;
        }
    }
    if !violations.is_empty() {
        println!("\n  Violations:");
        for (dimension, count) in &violations {
            println!("    {:<16} {}", dimension, count);
        }
    }
}

/// Pending review tasks, most urgent first.
pub fn display_review_queue(tasks: &[ReviewTask], limit: usize) {
    if tasks.is_empty() {
        return;
    }

    println!(
        "\n{}",
        format!("=== Review Queue ({} pending) ===", tasks.len()).bold()
    );
    println!();

    let mut sorted: Vec<&ReviewTask> = tasks.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sla_deadline.cmp(&b.sla_deadline)));

    for task in sorted.iter().take(limit) {
        let flags = task.flags.iter().cloned().collect::<Vec<_>>().join(",");
        println!(
            "  {:<9} {:<16} {:<18} risk {:.2}  conf {:.2}  {}",
            colorize_priority(task.priority),
            super::truncate_chars(&task.content_id, 16),
            task.reason.as_str(),
            task.combined_risk,
            task.confidence,
            flags.dimmed(),
        );
    }
    if sorted.len() > limit {
        println!("  {}", format!("... and {} more", sorted.len() - limit).dimmed());
    }
}

/// Allow/block totals and the flags behind the blocks.
pub fn display_chat_summary(decisions: &[RealtimeDecision]) {
    if decisions.is_empty() {
        println!("No chat messages processed.");
        return;
    }

    let blocked = decisions.iter().filter(|d| d.is_blocked()).count();
    println!(
        "\n{}",
        format!("=== Chat Decisions ({} messages) ===", decisions.len()).bold()
    );
    println!();
    println!(
        "  {} allowed   {} blocked",
        (decisions.len() - blocked).to_string().green(),
        blocked.to_string().red(),
    );

    let count = |pred: fn(&RealtimeDecision) -> bool| decisions.iter().filter(|d| pred(d)).count();
    let rows = [
        ("rate limited", count(|d| d.flags.rate_limited)),
        ("repeat message", count(|d| d.flags.repeat_message)),
        ("channel burst", count(|d| d.flags.burst_detected)),
        ("raid", count(|d| d.flags.raid_detected)),
        ("spam wave", count(|d| d.flags.spam_wave_detected)),
        ("scoring timeout", count(|d| d.flags.scoring_timeout)),
        ("over budget", count(|d| d.flags.deadline_exceeded)),
        ("queued for review", count(|d| d.flags.queued_for_review)),
    ];
    println!();
    for (label, n) in rows.iter().filter(|(_, n)| *n > 0) {
        println!("    {:<18} {}", label, n);
    }

    let mut by_channel: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for d in decisions {
        let entry = by_channel.entry(d.channel_id.as_str()).or_default();
        entry.0 += 1;
        if d.decision == RealtimeVerdict::Block {
            entry.1 += 1;
        }
    }
    println!("\n  By channel:");
    for (channel, (total, blocked)) in &by_channel {
        println!("    {:<14} {:>6} messages  {:>5} blocked", channel, total, blocked);
    }
}

/// Latency percentiles for one histogram, checked against a budget.
pub fn display_latency(metrics: &InMemoryMetrics, name: &str, budget_ms: u64) {
    let Some(p) = metrics.percentiles(name) else {
        return;
    };
    println!("\n  {} ({} samples):", name.bold(), p.count);
    print_percentile("p50", &p, |p| p.p50, budget_ms);
    print_percentile("p95", &p, |p| p.p95, budget_ms);
    print_percentile("p99", &p, |p| p.p99, budget_ms);
    print_percentile("max", &p, |p| p.max, budget_ms);
}

fn print_percentile(label: &str, p: &Percentiles, pick: fn(&Percentiles) -> std::time::Duration, budget_ms: u64) {
    let value = pick(p);
    let ms = value.as_secs_f64() * 1000.0;
    let shown = format!("{ms:>9.3} ms");
    let shown = if ms > budget_ms as f64 {
        shown.red()
    } else {
        shown.green()
    };
    println!("    {label}  {shown}");
}

/// Every counter series, for `--verbose` runs.
pub fn display_counters(metrics: &InMemoryMetrics) {
    println!("\n  {}", "Counters:".bold());
    for (series, value) in metrics.counters() {
        println!("    {:<56} {}", series.dimmed(), value);
    }
}

fn colorize_priority(priority: ReviewPriority) -> colored::ColoredString {
    let label = priority.as_str();
    match priority {
        ReviewPriority::Critical => label.red().bold(),
        ReviewPriority::Urgent => label.bright_red().bold(),
        ReviewPriority::High => label.bright_red(),
        ReviewPriority::Medium => label.yellow(),
        ReviewPriority::Low => label.green(),
    }
}
