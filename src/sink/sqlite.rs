// SqliteSink — rusqlite backend implementing DecisionSink.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Each write locks, runs one synchronous upsert, and returns. The guard is
// never held across an .await.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::SinkError;
use crate::models::{ChatMessage, Decision, RealtimeDecision, ReputationRecord, ReviewTask};

use super::schema;
use super::traits::DecisionSink;

const TABLES: &[&str] = &[
    "decisions",
    "realtime_decisions",
    "review_tasks",
    "reputations",
    "chat_reviews",
];

pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) the sink database and create its tables.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::create_tables(&conn)?;

        Ok(Self::new(conn))
    }

    /// Wrap an already-opened connection. Tables must already exist.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        schema::table_count(&conn)
    }

    /// Read back a stored content decision.
    pub async fn get_decision(&self, content_id: &str) -> Result<Option<Decision>> {
        let conn = self.conn.lock().await;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM decisions WHERE id = ?1",
                params![content_id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).context("Corrupt decision payload"))
            .transpose()
    }

    pub async fn get_review_task(&self, id: uuid::Uuid) -> Result<Option<ReviewTask>> {
        let conn = self.conn.lock().await;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM review_tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).context("Corrupt review task payload"))
            .transpose()
    }

    /// Row count for one of the sink tables.
    pub async fn count(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            anyhow::bail!("Unknown sink table: {}", table);
        }
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count)
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<String, SinkError> {
    serde_json::to_string(value).map_err(|e| SinkError::Backend(format!("serialize: {e}")))
}

fn backend(e: rusqlite::Error) -> SinkError {
    SinkError::Backend(e.to_string())
}

#[async_trait]
impl DecisionSink for SqliteSink {
    async fn write_decision(&self, decision: &Decision) -> Result<(), SinkError> {
        let payload = to_payload(decision)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO decisions (id, author_id, kind, tier, combined_risk, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                tier = excluded.tier,
                combined_risk = excluded.combined_risk,
                payload = excluded.payload,
                updated_at = datetime('now')",
            params![
                decision.content_id,
                decision.author_id,
                decision.kind.to_string(),
                decision.tier.number(),
                decision.combined_risk,
                payload,
            ],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn write_realtime_decision(&self, decision: &RealtimeDecision) -> Result<(), SinkError> {
        let payload = to_payload(decision)?;
        let latency_us = i64::try_from(decision.latency.as_micros()).unwrap_or(i64::MAX);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO realtime_decisions (id, channel_id, decision, latency_us, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                decision = excluded.decision,
                latency_us = excluded.latency_us,
                payload = excluded.payload,
                updated_at = datetime('now')",
            params![
                decision.message_id,
                decision.channel_id,
                decision.decision.to_string(),
                latency_us,
                payload,
            ],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn write_review_task(&self, task: &ReviewTask) -> Result<(), SinkError> {
        let payload = to_payload(task)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO review_tasks (id, content_id, priority, sla_deadline, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                priority = excluded.priority,
                payload = excluded.payload,
                updated_at = datetime('now')",
            params![
                task.id.to_string(),
                task.content_id,
                task.priority.to_string(),
                task.sla_deadline.to_rfc3339(),
                payload,
            ],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn write_reputation(&self, record: &ReputationRecord) -> Result<(), SinkError> {
        let payload = to_payload(record)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO reputations (id, score, tier, payload)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                score = excluded.score,
                tier = excluded.tier,
                payload = excluded.payload,
                updated_at = datetime('now')",
            params![record.user_id, record.score, record.tier.to_string(), payload],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn write_chat_review(&self, message: &ChatMessage) -> Result<(), SinkError> {
        let payload = to_payload(message)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_reviews (id, channel_id, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![message.id, message.channel_id, payload],
        )
        .map_err(backend)?;
        Ok(())
    }
}
