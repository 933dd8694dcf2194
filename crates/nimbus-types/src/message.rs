use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool_call::ToolCall;
use nimbus_core::id::{self, IdKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// Lifecycle of a message as shown in the thread. `Streaming` is reserved
/// for the single active assistant message; everything else is immutable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Completed,
    Error,
}

/// Side-channel "thinking" text some models emit before the answer body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reasoning {
    #[serde(default)]
    pub text: String,
    /// Unix millis of the first reasoning delta.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Input artifact (image/document) attached to the message that introduced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileAttachment {
    pub id: String,
    pub filename: String,
    pub mime: String,
    pub url: String,
}

impl FileAttachment {
    pub fn new(
        filename: impl Into<String>,
        mime: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id::generate(IdKind::File),
            filename: filename.into(),
            mime: mime.into(),
            url: url.into(),
        }
    }
}

/// A unit of conversation in a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub thread_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    /// Durability hint: follow-up messages exist only for display and must
    /// never be written to storage.
    #[serde(default)]
    pub skip_save: bool,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
}

impl ThreadMessage {
    pub fn user(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id::generate(IdKind::Message),
            thread_id: thread_id.into(),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
            status: MessageStatus::Completed,
            tool_calls: None,
            reasoning: None,
            skip_save: false,
            files: Vec::new(),
        }
    }

    /// The placeholder appended when a send begins; its content grows as
    /// deltas arrive and it is the only message allowed to stream.
    pub fn assistant_placeholder(thread_id: impl Into<String>) -> Self {
        Self {
            id: id::generate(IdKind::Message),
            thread_id: thread_id.into(),
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            status: MessageStatus::Streaming,
            tool_calls: None,
            reasoning: None,
            skip_save: false,
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<FileAttachment>) -> Self {
        self.files = files;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, MessageStatus::Completed | MessageStatus::Error)
    }
}
