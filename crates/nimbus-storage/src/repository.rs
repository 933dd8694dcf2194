use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use nimbus_types::{MessageRole, MessageStatus, ThreadMessage};

use crate::database::StorageError;

/// Boundary the chat engine talks to. The production implementation is the
/// SQLite repository; tests substitute their own.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn get_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, StorageError>;

    /// Append one finalized message. Writing the same id twice returns
    /// `StorageError::Duplicate`; the first write wins.
    async fn append_message(&self, message: &ThreadMessage) -> Result<(), StorageError>;
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    thread_id: String,
    role: String,
    content: String,
    status: String,
    created_at: i64,
    tool_calls: Option<String>,
    reasoning: Option<String>,
    files: Option<String>,
}

impl MessageRow {
    fn into_message(self) -> ThreadMessage {
        ThreadMessage {
            id: self.id,
            thread_id: self.thread_id,
            role: role_from_str(&self.role),
            content: self.content,
            created_at: DateTime::from_timestamp_millis(self.created_at).unwrap_or_else(Utc::now),
            status: status_from_str(&self.status),
            tool_calls: self
                .tool_calls
                .and_then(|json| serde_json::from_str(&json).ok()),
            reasoning: self
                .reasoning
                .and_then(|json| serde_json::from_str(&json).ok()),
            skip_save: false,
            files: self
                .files
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_default(),
        }
    }
}

fn role_to_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    }
}

fn role_from_str(role: &str) -> MessageRole {
    match role {
        "user" => MessageRole::User,
        "system" => MessageRole::System,
        "tool" => MessageRole::Tool,
        _ => MessageRole::Assistant,
    }
}

fn status_to_str(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Streaming => "streaming",
        MessageStatus::Completed => "completed",
        MessageStatus::Error => "error",
    }
}

fn status_from_str(status: &str) -> MessageStatus {
    match status {
        "streaming" => MessageStatus::Streaming,
        "error" => MessageStatus::Error,
        _ => MessageStatus::Completed,
    }
}

pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThreadStore for MessageRepository {
    async fn get_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, StorageError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, thread_id, role, content, status, created_at,
                   tool_calls, reasoning, files
            FROM messages
            WHERE thread_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn append_message(&self, message: &ThreadMessage) -> Result<(), StorageError> {
        let tool_calls = message
            .tool_calls
            .as_ref()
            .and_then(|calls| serde_json::to_string(calls).ok());
        let reasoning = message
            .reasoning
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok());
        let files = if message.files.is_empty() {
            None
        } else {
            serde_json::to_string(&message.files).ok()
        };

        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                id, thread_id, role, content, status, created_at,
                tool_calls, reasoning, files
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&message.id)
        .bind(&message.thread_id)
        .bind(role_to_str(message.role))
        .bind(&message.content)
        .bind(status_to_str(message.status))
        .bind(message.created_at.timestamp_millis())
        .bind(tool_calls)
        .bind(reasoning)
        .bind(files)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Duplicate(message.id.clone()));
        }
        Ok(())
    }
}
