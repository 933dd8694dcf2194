/// Messages table. Tool calls, reasoning, and file attachments are stored
/// as JSON columns; timestamps are milliseconds since epoch.
pub const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'completed',
    created_at INTEGER NOT NULL,

    -- Nested values (JSON)
    tool_calls TEXT,
    reasoning TEXT,
    files TEXT
);
"#;

pub const CREATE_MESSAGES_THREAD_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_thread_created
    ON messages(thread_id, created_at);
"#;

pub const ALL_MIGRATIONS: &[&str] = &[CREATE_MESSAGES_TABLE, CREATE_MESSAGES_THREAD_INDEX];
