use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Một cuộc hội thoại giữa hai người dùng.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Both participants derive the same id regardless of who opens the thread.
    pub fn between(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}:{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote location of an image attachment (an URL for the HTTP store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentRef(String);

impl AttachmentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Người dùng đang đăng nhập.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
}

/// Domain model đại diện một tin nhắn chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    /// Milliseconds since the Unix epoch.
    pub sent_at: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<AttachmentRef>,
    #[serde(skip)]
    pub attachment_data: Option<Vec<u8>>,
}

impl ChatMessage {
    pub fn text(sender: &UserProfile, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender.id.clone(),
            sender_display_name: sender.display_name.clone(),
            sent_at: Utc::now().timestamp_millis(),
            content: Some(content.into()),
            attachment_ref: None,
            attachment_data: None,
        }
    }

    /// A photo message whose bytes already live in the attachment store.
    pub fn photo(sender: &UserProfile, reference: AttachmentRef, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender.id.clone(),
            sender_display_name: sender.display_name.clone(),
            sent_at: Utc::now().timestamp_millis(),
            content: None,
            attachment_ref: Some(reference),
            attachment_data: Some(data),
        }
    }

    /// True when the message points at an attachment whose bytes are not here yet.
    pub fn needs_attachment(&self) -> bool {
        self.attachment_ref.is_some() && self.attachment_data.is_none()
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}
