use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::{AttachmentRef, ChatMessage, RemoteEvent, ThreadId};
use crate::error::{ChatError, Result};

use super::{AttachmentStore, EventSource, MessageSender, Subscription, SubscriptionHandle};

const MEMORY_SCHEME: &str = "memory://attachments/";

/// In-process backend: every thread, subscriber and attachment lives in one map.
///
/// Subscribing replays the stored thread before live messages, the way a
/// document listener reports existing documents first.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<ThreadId, Vec<ChatMessage>>,
    subscribers: HashMap<ThreadId, Vec<Subscriber>>,
    attachments: HashMap<AttachmentRef, Vec<u8>>,
    next_subscriber: u64,
}

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<RemoteEvent>,
}

impl Inner {
    fn deliver(&mut self, thread_id: &ThreadId, message: &ChatMessage) {
        if let Some(subscribers) = self.subscribers.get_mut(thread_id) {
            subscribers.retain(|subscriber| {
                subscriber
                    .sender
                    .send(RemoteEvent::Message(message.clone()))
                    .is_ok()
            });
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a message as if another participant had sent it.
    pub fn inject(&self, thread_id: &ThreadId, mut message: ChatMessage) {
        message.attachment_data = None;
        let mut inner = self.lock();
        inner.deliver(thread_id, &message);
        inner
            .threads
            .entry(thread_id.clone())
            .or_default()
            .push(message);
    }

    /// Re-delivers an already stored message, as a flaky listener would.
    pub fn redeliver(&self, thread_id: &ThreadId, message_id: &str) -> bool {
        let mut inner = self.lock();
        let Some(message) = inner
            .threads
            .get(thread_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id))
            .cloned()
        else {
            return false;
        };
        inner.deliver(thread_id, &message);
        true
    }

    pub fn fail_subscribers(&self, thread_id: &ThreadId, reason: &str) {
        let mut inner = self.lock();
        if let Some(subscribers) = inner.subscribers.get_mut(thread_id) {
            subscribers.retain(|subscriber| {
                subscriber
                    .sender
                    .send(RemoteEvent::Error(ChatError::Subscription(reason.to_string())))
                    .is_ok()
            });
        }
    }

    pub fn put_attachment(&self, reference: AttachmentRef, data: Vec<u8>) {
        self.lock().attachments.insert(reference, data);
    }

    pub fn messages(&self, thread_id: &ThreadId) -> Vec<ChatMessage> {
        self.lock()
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, thread_id: &ThreadId) -> usize {
        self.lock()
            .subscribers
            .get(thread_id)
            .map_or(0, |subscribers| subscribers.len())
    }
}

#[async_trait]
impl EventSource for MemoryBackend {
    async fn subscribe(&self, thread_id: &ThreadId) -> Result<Subscription> {
        let (sender, events) = mpsc::unbounded_channel();
        let subscriber_id = {
            let mut inner = self.lock();
            for message in inner.threads.get(thread_id).into_iter().flatten() {
                // Receiver is still in scope, so this cannot fail.
                let _ = sender.send(RemoteEvent::Message(message.clone()));
            }
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner
                .subscribers
                .entry(thread_id.clone())
                .or_default()
                .push(Subscriber { id, sender });
            id
        };
        log::debug!("Memory subscriber {subscriber_id} attached to {thread_id}");

        let inner = self.inner.clone();
        let released_thread = thread_id.clone();
        let handle = SubscriptionHandle::new(thread_id.clone(), move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(subscribers) = inner.subscribers.get_mut(&released_thread) {
                subscribers.retain(|subscriber| subscriber.id != subscriber_id);
                if subscribers.is_empty() {
                    inner.subscribers.remove(&released_thread);
                }
            }
        });

        Ok(Subscription { events, handle })
    }
}

#[async_trait]
impl MessageSender for MemoryBackend {
    async fn send(&self, thread_id: &ThreadId, message: ChatMessage) -> Result<()> {
        self.inject(thread_id, message);
        Ok(())
    }
}

#[async_trait]
impl AttachmentStore for MemoryBackend {
    async fn fetch(&self, reference: &AttachmentRef) -> Result<Vec<u8>> {
        self.lock()
            .attachments
            .get(reference)
            .cloned()
            .ok_or_else(|| ChatError::fetch(reference, "no such attachment"))
    }

    async fn upload(&self, thread_id: &ThreadId, data: Vec<u8>) -> Result<AttachmentRef> {
        let reference = AttachmentRef::new(format!("{MEMORY_SCHEME}{thread_id}/{}", Uuid::new_v4()));
        self.put_attachment(reference.clone(), data);
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::UserProfile;

    fn bob() -> UserProfile {
        UserProfile {
            id: "bob".to_string(),
            display_name: "Bob".to_string(),
        }
    }

    fn next_message(events: &mut mpsc::UnboundedReceiver<RemoteEvent>) -> ChatMessage {
        match events.try_recv() {
            Ok(RemoteEvent::Message(message)) => message,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_replays_history_then_live_messages() {
        let backend = MemoryBackend::new();
        let thread = ThreadId::between("alice", "bob");
        let first = ChatMessage::text(&bob(), "first");
        backend.inject(&thread, first.clone());

        let mut subscription = backend.subscribe(&thread).await.unwrap();
        let second = ChatMessage::text(&bob(), "second");
        backend.send(&thread, second.clone()).await.unwrap();

        assert_eq!(next_message(&mut subscription.events).id, first.id);
        assert_eq!(next_message(&mut subscription.events).id, second.id);
    }

    #[tokio::test]
    async fn dropping_handle_removes_subscriber() {
        let backend = MemoryBackend::new();
        let thread = ThreadId::new("t");

        let subscription = backend.subscribe(&thread).await.unwrap();
        assert_eq!(backend.subscriber_count(&thread), 1);

        drop(subscription.handle);
        assert_eq!(backend.subscriber_count(&thread), 0);
    }

    #[tokio::test]
    async fn stored_photos_lose_their_bytes() {
        let backend = MemoryBackend::new();
        let thread = ThreadId::new("t");
        let reference = backend.upload(&thread, vec![9, 9]).await.unwrap();

        backend
            .send(&thread, ChatMessage::photo(&bob(), reference.clone(), vec![9, 9]))
            .await
            .unwrap();

        let stored = backend.messages(&thread);
        assert!(stored[0].needs_attachment());
        assert_eq!(backend.fetch(&reference).await.unwrap(), vec![9, 9]);
    }

    #[tokio::test]
    async fn unknown_attachment_fails_to_fetch() {
        let backend = MemoryBackend::new();
        let err = backend
            .fetch(&AttachmentRef::new("memory://attachments/missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::AttachmentFetch { .. }));
    }
}
