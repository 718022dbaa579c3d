//! SQLite-backed run store
//!
//! Durable backend over a shared connection pool. Timestamps are stored as
//! RFC 3339 text and JSON columns as serialized text, keeping the schema
//! portable and inspectable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use threatscope_common::{Error, Result};
use uuid::Uuid;

use super::{EventRecord, RunRecord, RunStatus, RunStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize tables.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // mode=rwc: read, write, create
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    /// Build a store over an existing pool (tests).
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                thread_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                user_message TEXT NOT NULL,
                input_data TEXT NOT NULL,
                status TEXT NOT NULL,
                final_summary TEXT,
                total_events INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_thread_seq ON events(thread_id, seq)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database tables initialized (runs, events)");
        Ok(())
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<RunRecord> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let input_data: String = row.get("input_data");
    let status: String = row.get("status");

    Ok(RunRecord {
        thread_id: row.get("thread_id"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        user_message: row.get("user_message"),
        input_data: serde_json::from_str(&input_data)
            .map_err(|e| Error::Internal(format!("Failed to deserialize input_data: {}", e)))?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown run status: {}", status)))?,
        final_summary: row.get("final_summary"),
        total_events: row.get("total_events"),
    })
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<EventRecord> {
    let id: String = row.get("id");
    let timestamp: String = row.get("timestamp");
    let payload: String = row.get("payload");

    Ok(EventRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid event id: {}", e)))?,
        thread_id: row.get("thread_id"),
        event_type: row.get("event_type"),
        seq: row.get::<i64, _>("seq") as u64,
        timestamp: parse_timestamp(&timestamp)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| Error::Internal(format!("Failed to deserialize payload: {}", e)))?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn create_run(
        &self,
        thread_id: &str,
        user_message: &str,
        input_data: Value,
    ) -> Result<RunRecord> {
        let now = Utc::now();
        let input_json = serde_json::to_string(&input_data)
            .map_err(|e| Error::Internal(format!("Failed to serialize input_data: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO runs (
                thread_id, created_at, updated_at, user_message,
                input_data, status, final_summary, total_events
            ) VALUES (?, ?, ?, ?, ?, ?, NULL, 0)
            ON CONFLICT(thread_id) DO UPDATE SET
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                user_message = excluded.user_message,
                input_data = excluded.input_data,
                status = excluded.status,
                final_summary = NULL,
                total_events = 0
            "#,
        )
        .bind(thread_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(user_message)
        .bind(&input_json)
        .bind(RunStatus::Streaming.as_str())
        .execute(&self.pool)
        .await?;

        // A recreated run starts with a fresh event log
        sqlx::query("DELETE FROM events WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

        Ok(RunRecord {
            thread_id: thread_id.to_string(),
            created_at: now,
            updated_at: now,
            user_message: user_message.to_string(),
            input_data,
            status: RunStatus::Streaming,
            final_summary: None,
            total_events: 0,
        })
    }

    async fn get_run(&self, thread_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query("SELECT * FROM runs WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn update_status(
        &self,
        thread_id: &str,
        status: RunStatus,
        final_summary: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?, updated_at = ?,
                final_summary = COALESCE(?, final_summary)
            WHERE thread_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(final_summary)
        .bind(thread_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY updated_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_run).collect()
    }

    async fn delete_run(&self, thread_id: &str) -> Result<bool> {
        sqlx::query("DELETE FROM events WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM runs WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_event(&self, event: &EventRecord) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO events (id, thread_id, event_type, seq, timestamp, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.thread_id)
        .bind(&event.event_type)
        .bind(event.seq as i64)
        .bind(event.timestamp.to_rfc3339())
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE runs SET total_events = total_events + 1, updated_at = ? WHERE thread_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&event.thread_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_events(&self, thread_id: &str) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query("SELECT * FROM events WHERE thread_id = ? ORDER BY seq ASC")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }
}
