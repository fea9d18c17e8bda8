//! SQLite backend — one database file for the whole deployment.
//!
//! Tables:
//! - `conversations` — one row per widget session
//! - `messages`      — turn history, cascades with its conversation
//! - `documents`     — admin-managed knowledge-base entries
//! - `prompts`       — admin-managed instruction entries
//! - `trace_logs`    — write-once per-turn audit rows, cascades with
//!   its conversation
//!
//! Migrations run in code on open; timestamps are stored as RFC 3339.

use async_trait::async_trait;
use chrono::Utc;
use sproutline_core::error::StorageError;
use sproutline_core::knowledge::{InstructionEntry, InstructionKind, KnowledgeEntry};
use sproutline_core::message::{ConversationId, Message, Role};
use sproutline_core::storage::Storage;
use sproutline_core::trace::TraceRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// The production SQLite storage backend.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Storage(format!("Failed to open SQLite: {e}")))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        info!("SQLite storage initialized at {path}");
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id         TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id         TEXT PRIMARY KEY,
                title      TEXT NOT NULL,
                body       TEXT NOT NULL,
                category   TEXT NOT NULL,
                active     INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("documents table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompts (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                body       TEXT NOT NULL,
                kind       TEXT NOT NULL,
                active     INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("prompts table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trace_logs (
                id                 TEXT PRIMARY KEY,
                conversation_id    TEXT REFERENCES conversations(id) ON DELETE CASCADE,
                request_id         TEXT,
                model              TEXT NOT NULL,
                prompt_tokens      INTEGER NOT NULL DEFAULT 0,
                completion_tokens  INTEGER NOT NULL DEFAULT 0,
                total_tokens       INTEGER NOT NULL DEFAULT 0,
                user_text          TEXT NOT NULL,
                assistant_text     TEXT,
                guardrail_result   TEXT NOT NULL,
                evaluator_score    INTEGER,
                evaluator_feedback TEXT,
                blocked            INTEGER NOT NULL DEFAULT 0,
                block_reason       TEXT,
                latency_ms         INTEGER NOT NULL DEFAULT 0,
                created_at         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("trace_logs table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trace_logs_created_at
             ON trace_logs(created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("trace_logs index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> chrono::DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeEntry, StorageError> {
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        Ok(KnowledgeEntry {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
            title: row
                .try_get("title")
                .map_err(|e| StorageError::QueryFailed(format!("title column: {e}")))?,
            body: row
                .try_get("body")
                .map_err(|e| StorageError::QueryFailed(format!("body column: {e}")))?,
            category: row
                .try_get("category")
                .map_err(|e| StorageError::QueryFailed(format!("category column: {e}")))?,
            active: row.try_get::<i64, _>("active").unwrap_or(0) != 0,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_prompt(row: &sqlx::sqlite::SqliteRow) -> Result<InstructionEntry, StorageError> {
        let kind_raw: String = row
            .try_get("kind")
            .map_err(|e| StorageError::QueryFailed(format!("kind column: {e}")))?;
        let kind = InstructionKind::from_str(&kind_raw)
            .map_err(StorageError::QueryFailed)?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        Ok(InstructionEntry {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
            name: row
                .try_get("name")
                .map_err(|e| StorageError::QueryFailed(format!("name column: {e}")))?,
            body: row
                .try_get("body")
                .map_err(|e| StorageError::QueryFailed(format!("body column: {e}")))?,
            kind,
            active: row.try_get::<i64, _>("active").unwrap_or(0) != 0,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StorageError> {
        let role_raw: String = row
            .try_get("role")
            .map_err(|e| StorageError::QueryFailed(format!("role column: {e}")))?;
        let role = Role::from_str(&role_raw).map_err(StorageError::QueryFailed)?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        Ok(Message {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
            role,
            content: row
                .try_get("content")
                .map_err(|e| StorageError::QueryFailed(format!("content column: {e}")))?,
            timestamp: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_trace(row: &sqlx::sqlite::SqliteRow) -> Result<TraceRecord, StorageError> {
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        let conversation_id: Option<String> = row
            .try_get("conversation_id")
            .map_err(|e| StorageError::QueryFailed(format!("conversation_id column: {e}")))?;
        Ok(TraceRecord {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
            conversation_id: conversation_id.map(ConversationId),
            request_id: row.try_get("request_id").unwrap_or(None),
            model: row
                .try_get("model")
                .map_err(|e| StorageError::QueryFailed(format!("model column: {e}")))?,
            prompt_tokens: row.try_get::<i64, _>("prompt_tokens").unwrap_or(0) as u32,
            completion_tokens: row.try_get::<i64, _>("completion_tokens").unwrap_or(0) as u32,
            total_tokens: row.try_get::<i64, _>("total_tokens").unwrap_or(0) as u32,
            user_text: row
                .try_get("user_text")
                .map_err(|e| StorageError::QueryFailed(format!("user_text column: {e}")))?,
            assistant_text: row.try_get("assistant_text").unwrap_or(None),
            guardrail_result: row
                .try_get("guardrail_result")
                .map_err(|e| StorageError::QueryFailed(format!("guardrail_result column: {e}")))?,
            evaluator_score: row
                .try_get::<Option<i64>, _>("evaluator_score")
                .unwrap_or(None)
                .map(|s| s.clamp(0, 100) as u8),
            evaluator_feedback: row.try_get("evaluator_feedback").unwrap_or(None),
            blocked: row.try_get::<i64, _>("blocked").unwrap_or(0) != 0,
            block_reason: row.try_get("block_reason").unwrap_or(None),
            latency_ms: row.try_get::<i64, _>("latency_ms").unwrap_or(0) as u64,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    /// Insert the conversation row if it is new.
    async fn ensure_conversation(&self, conversation: &ConversationId) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO conversations (id, created_at) VALUES (?, ?)")
            .bind(&conversation.0)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("conversation insert: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn active_documents(&self) -> Result<Vec<KnowledgeEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE active = 1 ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("active documents: {e}")))?;
        rows.iter().map(Self::row_to_document).collect()
    }

    async fn active_prompts(&self) -> Result<Vec<InstructionEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM prompts WHERE active = 1 ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("active prompts: {e}")))?;
        rows.iter().map(Self::row_to_prompt).collect()
    }

    async fn messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&conversation.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("messages: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StorageError> {
        self.ensure_conversation(conversation).await?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&conversation.0)
        .bind(role.as_str())
        .bind(&message.content)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("message insert: {e}")))?;
        Ok(message)
    }

    async fn record_trace(&self, record: TraceRecord) -> Result<String, StorageError> {
        if let Some(conversation) = &record.conversation_id {
            self.ensure_conversation(conversation).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO trace_logs (
                id, conversation_id, request_id, model,
                prompt_tokens, completion_tokens, total_tokens,
                user_text, assistant_text, guardrail_result,
                evaluator_score, evaluator_feedback,
                blocked, block_reason, latency_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.conversation_id.as_ref().map(|c| c.0.as_str()))
        .bind(&record.request_id)
        .bind(&record.model)
        .bind(record.prompt_tokens as i64)
        .bind(record.completion_tokens as i64)
        .bind(record.total_tokens as i64)
        .bind(&record.user_text)
        .bind(&record.assistant_text)
        .bind(&record.guardrail_result)
        .bind(record.evaluator_score.map(|s| s as i64))
        .bind(&record.evaluator_feedback)
        .bind(record.blocked as i64)
        .bind(&record.block_reason)
        .bind(record.latency_ms as i64)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("trace insert: {e}")))?;
        Ok(record.id)
    }

    async fn create_document(&self, entry: KnowledgeEntry) -> Result<String, StorageError> {
        sqlx::query(
            "INSERT INTO documents (id, title, body, category, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(&entry.category)
        .bind(entry.active as i64)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("document insert: {e}")))?;
        Ok(entry.id)
    }

    async fn list_documents(&self) -> Result<Vec<KnowledgeEntry>, StorageError> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("list documents: {e}")))?;
        rows.iter().map(Self::row_to_document).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("document delete: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_prompt(&self, entry: InstructionEntry) -> Result<String, StorageError> {
        sqlx::query(
            "INSERT INTO prompts (id, name, body, kind, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.name)
        .bind(&entry.body)
        .bind(entry.kind.as_str())
        .bind(entry.active as i64)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("prompt insert: {e}")))?;
        Ok(entry.id)
    }

    async fn list_prompts(&self) -> Result<Vec<InstructionEntry>, StorageError> {
        let rows = sqlx::query("SELECT * FROM prompts ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("list prompts: {e}")))?;
        rows.iter().map(Self::row_to_prompt).collect()
    }

    async fn delete_prompt(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM prompts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("prompt delete: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_traces(&self, limit: usize) -> Result<Vec<TraceRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM trace_logs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list traces: {e}")))?;
        rows.iter().map(Self::row_to_trace).collect()
    }

    async fn delete_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<bool, StorageError> {
        // Messages and trace rows cascade via foreign keys.
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(&conversation.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("conversation delete: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
