//! Collaborators behind a thread view: where events come from, where messages
//! go, and where attachment bytes live.

pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::{AttachmentRef, ChatMessage, RemoteEvent, ThreadId};
use crate::error::Result;

pub use http::HttpAttachmentStore;
pub use memory::MemoryBackend;

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self, thread_id: &ThreadId) -> Result<Subscription>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn fetch(&self, reference: &AttachmentRef) -> Result<Vec<u8>>;
    async fn upload(&self, thread_id: &ThreadId, data: Vec<u8>) -> Result<AttachmentRef>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, thread_id: &ThreadId, message: ChatMessage) -> Result<()>;
}

/// The three collaborators a thread session needs.
#[derive(Clone)]
pub struct Backend {
    pub events: Arc<dyn EventSource>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub sender: Arc<dyn MessageSender>,
}

impl Backend {
    pub fn new(
        events: Arc<dyn EventSource>,
        attachments: Arc<dyn AttachmentStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            events,
            attachments,
            sender,
        }
    }

    pub fn memory(backend: MemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            events: backend.clone(),
            attachments: backend.clone(),
            sender: backend,
        }
    }
}

/// Releases a backend subscription when dropped.
pub struct SubscriptionHandle {
    thread_id: ThreadId,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandle {
    pub fn new(thread_id: ThreadId, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            thread_id,
            release: Some(Box::new(release)),
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            log::debug!("Releasing subscription for thread {}", self.thread_id);
            release();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Live delivery for one thread. The events stop once `handle` is released.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<RemoteEvent>,
    pub handle: SubscriptionHandle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handle_releases_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let handle = SubscriptionHandle::new(ThreadId::new("t"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(handle);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_unsubscribe_does_not_release_twice() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let handle = SubscriptionHandle::new(ThreadId::new("t"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
