//! One open thread view.
//!
//! Remote events flow `backend -> pump -> updates channel -> ThreadSession`.
//! The pump resolves attachments before forwarding, so the session only ever
//! ingests complete messages and does so one at a time in arrival order.
//! Sends go through a separate outbox task whose results land in the same
//! updates channel.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::backend::{AttachmentStore, Backend, MessageSender, Subscription, SubscriptionHandle};
use crate::common::{ChatMessage, Notice, OutboxCommand, RemoteEvent, ThreadId, UserProfile};
use crate::error::{ChatError, Result};
use crate::reconciler::{InsertOutcome, ThreadState};

#[derive(Debug)]
enum ThreadUpdate {
    Resolved(ChatMessage),
    Failed(ChatError),
    Sent,
    SendingPhoto(bool),
}

pub struct ThreadSession {
    thread_id: ThreadId,
    profile: UserProfile,
    state: ThreadState,
    updates: mpsc::Receiver<ThreadUpdate>,
    outbox: mpsc::Sender<OutboxCommand>,
    subscription: Option<SubscriptionHandle>,
    sending_photo: bool,
}

impl ThreadSession {
    pub async fn open(
        backend: &Backend,
        profile: UserProfile,
        thread_id: ThreadId,
        capacity: usize,
    ) -> Result<Self> {
        let Subscription { events, handle } = backend.events.subscribe(&thread_id).await?;

        let capacity = capacity.max(1);
        let (update_tx, updates) = mpsc::channel(capacity);
        let (outbox, outbox_rx) = mpsc::channel(capacity);

        tokio::spawn(pump(
            events,
            backend.attachments.clone(),
            update_tx.clone(),
        ));
        tokio::spawn(run_outbox(
            outbox_rx,
            Outbox {
                thread_id: thread_id.clone(),
                profile: profile.clone(),
                attachments: backend.attachments.clone(),
                sender: backend.sender.clone(),
            },
            update_tx,
        ));

        log::info!("Opened thread {thread_id} as {}", profile.id);
        Ok(Self {
            thread_id,
            profile,
            state: ThreadState::new(),
            updates,
            outbox,
            subscription: Some(handle),
            sending_photo: false,
        })
    }

    /// Applies every update that is already waiting. Never blocks.
    pub fn poll(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            notices.push(self.apply(update));
        }
        notices
    }

    /// Waits for the next update and applies it.
    pub async fn next(&mut self) -> Option<Notice> {
        let update = self.updates.recv().await?;
        Some(self.apply(update))
    }

    fn apply(&mut self, update: ThreadUpdate) -> Notice {
        match update {
            ThreadUpdate::Resolved(message) => {
                let id = message.id.clone();
                match self.state.ingest(message) {
                    InsertOutcome::Inserted { is_newest } => Notice::Inserted { id, is_newest },
                    InsertOutcome::Duplicate => {
                        log::debug!("Ignoring duplicate message {id}");
                        Notice::Duplicate { id }
                    }
                }
            }
            ThreadUpdate::Failed(err) => {
                log::warn!("Thread {}: {err}", self.thread_id);
                Notice::Failed(err)
            }
            ThreadUpdate::Sent => Notice::Sent,
            ThreadUpdate::SendingPhoto(sending) => {
                self.sending_photo = sending;
                Notice::SendingPhoto(sending)
            }
        }
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.enqueue(OutboxCommand::SendText(text.to_string()))
    }

    pub fn send_photo(&self, data: Vec<u8>) -> Result<()> {
        if data.is_empty() {
            return Err(ChatError::AttachmentUpload("image is empty".to_string()));
        }
        self.enqueue(OutboxCommand::SendPhoto(data))
    }

    fn enqueue(&self, command: OutboxCommand) -> Result<()> {
        self.outbox.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => ChatError::Send("too many pending sends".to_string()),
            TrySendError::Closed(_) => ChatError::Closed("outbox"),
        })
    }

    /// Releases the subscription now instead of on drop.
    pub fn close(mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    pub fn state(&self) -> &ThreadState {
        &self.state
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn is_sending_photo(&self) -> bool {
        self.sending_photo
    }
}

async fn resolve_attachment(
    mut message: ChatMessage,
    store: &dyn AttachmentStore,
) -> Result<ChatMessage> {
    let Some(reference) = message
        .attachment_ref
        .clone()
        .filter(|_| message.needs_attachment())
    else {
        return Ok(message);
    };

    let data = store.fetch(&reference).await?;
    message.attachment_data = Some(data);
    Ok(message)
}

async fn pump(
    mut events: mpsc::UnboundedReceiver<RemoteEvent>,
    attachments: Arc<dyn AttachmentStore>,
    updates: mpsc::Sender<ThreadUpdate>,
) {
    while let Some(event) = events.recv().await {
        let update = match event {
            RemoteEvent::Message(message) => {
                match resolve_attachment(message, attachments.as_ref()).await {
                    Ok(message) => ThreadUpdate::Resolved(message),
                    Err(err) => ThreadUpdate::Failed(err),
                }
            }
            RemoteEvent::Error(err) => ThreadUpdate::Failed(err),
        };

        if updates.send(update).await.is_err() {
            log::debug!("Thread view closed; dropping resolved event");
            break;
        }
    }
}

struct Outbox {
    thread_id: ThreadId,
    profile: UserProfile,
    attachments: Arc<dyn AttachmentStore>,
    sender: Arc<dyn MessageSender>,
}

async fn run_outbox(
    mut commands: mpsc::Receiver<OutboxCommand>,
    outbox: Outbox,
    updates: mpsc::Sender<ThreadUpdate>,
) {
    while let Some(command) = commands.recv().await {
        let result = match command {
            OutboxCommand::SendText(text) => {
                let message = ChatMessage::text(&outbox.profile, text);
                outbox.sender.send(&outbox.thread_id, message).await
            }
            OutboxCommand::SendPhoto(data) => {
                let _ = updates.send(ThreadUpdate::SendingPhoto(true)).await;
                let uploaded = outbox
                    .attachments
                    .upload(&outbox.thread_id, data.clone())
                    .await;
                let _ = updates.send(ThreadUpdate::SendingPhoto(false)).await;

                match uploaded {
                    Ok(reference) => {
                        let message = ChatMessage::photo(&outbox.profile, reference, data);
                        outbox.sender.send(&outbox.thread_id, message).await
                    }
                    Err(err) => Err(err),
                }
            }
        };

        let update = match result {
            Ok(()) => ThreadUpdate::Sent,
            Err(err) => ThreadUpdate::Failed(err),
        };
        if updates.send(update).await.is_err() {
            break;
        }
    }
}
