use rusqlite::{Connection, Result as SqlResult, Row, params};
use std::path::Path;
use std::time::Duration;

use crate::common::{AttachmentRef, ChatMessage, ThreadId};

/// Lịch sử tin nhắn theo thread (dùng bởi P2P backend).
pub struct MessageDatabase {
    conn: Connection,
}

impl MessageDatabase {
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        // Nhiều tiến trình client có thể mở cùng file khi chạy thử trên một máy.
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqlResult<Self> {
        let message_db = Self { conn };
        message_db.init_schema()?;
        Ok(message_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let conn = &self.conn;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sender_display_name TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                content TEXT,
                attachment_ref TEXT,
                received_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_sent_at
             ON messages(thread_id, sent_at)",
            [],
        )?;

        Ok(())
    }

    /// Insert a message; returns `false` when the id is already stored.
    pub fn insert_message(&self, thread_id: &ThreadId, message: &ChatMessage) -> SqlResult<bool> {
        let conn = &self.conn;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO messages
                (id, thread_id, sender_id, sender_display_name, sent_at, content, attachment_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                thread_id.as_str(),
                message.sender_id,
                message.sender_display_name,
                message.sent_at,
                message.content,
                message.attachment_ref.as_ref().map(AttachmentRef::as_str),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Thread history ordered by send time (arrival order breaks ties).
    pub fn thread_messages(&self, thread_id: &ThreadId) -> SqlResult<Vec<ChatMessage>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, sender_display_name, sent_at, content, attachment_ref
             FROM messages
             WHERE thread_id = ?1
             ORDER BY sent_at ASC, rowid ASC",
        )?;

        let messages = stmt
            .query_map(params![thread_id.as_str()], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    pub fn message_count(&self, thread_id: &ThreadId) -> SqlResult<usize> {
        let conn = &self.conn;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
            params![thread_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn message_from_row(row: &Row<'_>) -> SqlResult<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_display_name: row.get(2)?,
        sent_at: row.get(3)?,
        content: row.get(4)?,
        attachment_ref: row.get::<_, Option<String>>(5)?.map(AttachmentRef::new),
        attachment_data: None,
    })
}
