use crate::error::ChatError;

use super::types::ChatMessage;

/// Sự kiện backend đẩy lên cho một subscription.
#[derive(Debug)]
pub enum RemoteEvent {
    Message(ChatMessage),
    Error(ChatError),
}

/// What a thread session reports to the presentation layer after applying an update.
#[derive(Debug)]
pub enum Notice {
    Inserted { id: String, is_newest: bool },
    Duplicate { id: String },
    Failed(ChatError),
    /// A send completed; the message itself arrives later through the subscription.
    Sent,
    SendingPhoto(bool),
}
