//! Ordered, deduplicated view of one chat thread.
//!
//! Remote events arrive in any order and may repeat. [`ThreadState::ingest`]
//! keeps `messages` unique by id and sorted ascending by `sent_at`, and tells
//! the caller whether the new message landed at the tail.

use std::collections::HashSet;

use crate::common::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { is_newest: bool },
    Duplicate,
}

/// Trạng thái tin nhắn của một thread đang mở.
#[derive(Debug, Default)]
pub struct ThreadState {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl ThreadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, message: ChatMessage) -> InsertOutcome {
        if self.ids.contains(&message.id) {
            return InsertOutcome::Duplicate;
        }

        // Equal timestamps go after existing ones, same as append + stable sort.
        let position = self
            .messages
            .partition_point(|existing| existing.sent_at <= message.sent_at);
        self.ids.insert(message.id.clone());
        self.messages.insert(position, message);

        InsertOutcome::Inserted {
            is_newest: position == self.messages.len() - 1,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub fn should_auto_scroll(is_newest: bool, viewer_is_at_bottom: bool) -> bool {
    is_newest && viewer_is_at_bottom
}
