// Sink schema — idempotent table creation.
//
// Entities are stored as JSON payloads keyed by their id, with a few
// columns pulled out for ad-hoc querying. Safe to run on every startup.

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per content item; rewritten when a human resolves it
        CREATE TABLE IF NOT EXISTS decisions (
            id TEXT PRIMARY KEY,               -- content id
            author_id TEXT NOT NULL,
            kind TEXT NOT NULL,                -- approved / rejected / escalated
            tier INTEGER NOT NULL,             -- 1 triage, 2 ml, 3 escalation, 4 human
            combined_risk REAL NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS realtime_decisions (
            id TEXT PRIMARY KEY,               -- message id
            channel_id TEXT NOT NULL,
            decision TEXT NOT NULL,            -- allow / block
            latency_us INTEGER NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS review_tasks (
            id TEXT PRIMARY KEY,               -- task uuid
            content_id TEXT NOT NULL,
            priority TEXT NOT NULL,
            sla_deadline TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS reputations (
            id TEXT PRIMARY KEY,               -- user id
            score REAL NOT NULL,
            tier TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Chat messages held for asynchronous human review
        CREATE TABLE IF NOT EXISTS chat_reviews (
            id TEXT PRIMARY KEY,               -- message id
            channel_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            queued_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_decisions_author ON decisions(author_id);
        CREATE INDEX IF NOT EXISTS idx_review_tasks_deadline ON review_tasks(sla_deadline);
        ",
    )
    .context("Failed to create sink tables")?;

    Ok(())
}

/// Number of user tables (used by `sentinel init`).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
