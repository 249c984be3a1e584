use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

use super::events::RemoteEvent;
use super::types::{ChatMessage, ThreadId};

/// Lệnh từ UI gửi xuống outbox của một thread.
#[derive(Debug, Clone)]
pub enum OutboxCommand {
    SendText(String),
    /// Upload ảnh rồi gửi tin nhắn trỏ tới ảnh đó.
    SendPhoto(Vec<u8>),
}

/// Lệnh gửi tới vòng lặp của P2P node.
#[derive(Debug)]
pub enum NodeCommand {
    Subscribe {
        thread_id: ThreadId,
        reply: oneshot::Sender<Result<(u64, mpsc::UnboundedReceiver<RemoteEvent>)>>,
    },
    Unsubscribe {
        thread_id: ThreadId,
        subscriber_id: u64,
    },
    Publish {
        thread_id: ThreadId,
        message: ChatMessage,
        reply: oneshot::Sender<Result<()>>,
    },
}
