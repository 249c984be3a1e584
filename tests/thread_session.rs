use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_chats::backend::{AttachmentStore, MessageSender};
use rust_chats::common::AttachmentRef;
use rust_chats::{
    Backend, ChatError, ChatMessage, MemoryBackend, Notice, Result, ThreadId, ThreadSession,
    UserProfile,
};

fn alice() -> UserProfile {
    UserProfile {
        id: "alice@example.com".to_string(),
        display_name: "Alice".to_string(),
    }
}

fn thread() -> ThreadId {
    ThreadId::between("alice@example.com", "bob@example.com")
}

fn from_bob(id: &str, sent_at: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        sender_id: "bob@example.com".to_string(),
        sender_display_name: "Bob".to_string(),
        sent_at,
        content: Some(format!("message {id}")),
        attachment_ref: None,
        attachment_data: None,
    }
}

async fn open(backend: Backend) -> ThreadSession {
    ThreadSession::open(&backend, alice(), thread(), 16)
        .await
        .unwrap()
}

async fn next_notice(session: &mut ThreadSession) -> Notice {
    tokio::time::timeout(Duration::from_secs(2), session.next())
        .await
        .expect("timed out waiting for a notice")
        .expect("session channel closed")
}

async fn take_notices(session: &mut ThreadSession, count: usize) -> Vec<Notice> {
    let mut notices = Vec::with_capacity(count);
    for _ in 0..count {
        notices.push(next_notice(session).await);
    }
    notices
}

fn ids(session: &ThreadSession) -> Vec<&str> {
    session.messages().iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn late_arrival_lands_between_its_neighbours() {
    let memory = MemoryBackend::new();
    memory.inject(&thread(), from_bob("a", 10));
    memory.inject(&thread(), from_bob("c", 30));

    let mut session = open(Backend::memory(memory.clone())).await;
    take_notices(&mut session, 2).await;
    assert_eq!(ids(&session), ["a", "c"]);

    memory.inject(&thread(), from_bob("b", 20));
    match next_notice(&mut session).await {
        Notice::Inserted { id, is_newest } => {
            assert_eq!(id, "b");
            assert!(!is_newest);
        }
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(ids(&session), ["a", "b", "c"]);
}

#[tokio::test]
async fn redelivered_message_is_reported_as_duplicate() {
    let memory = MemoryBackend::new();
    let mut session = open(Backend::memory(memory.clone())).await;

    memory.inject(&thread(), from_bob("m1", 10));
    assert!(matches!(
        next_notice(&mut session).await,
        Notice::Inserted { is_newest: true, .. }
    ));

    assert!(memory.redeliver(&thread(), "m1"));
    match next_notice(&mut session).await {
        Notice::Duplicate { id } => assert_eq!(id, "m1"),
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(session.messages().len(), 1);
}

#[tokio::test]
async fn sent_text_comes_back_through_the_subscription() {
    let memory = MemoryBackend::new();
    let mut session = open(Backend::memory(memory.clone())).await;

    session.send_text("  hello bob  ").unwrap();
    let notices = take_notices(&mut session, 2).await;

    assert!(notices.iter().any(|n| matches!(n, Notice::Sent)));
    assert!(notices.iter().any(|n| matches!(n, Notice::Inserted { .. })));
    assert_eq!(session.messages()[0].content.as_deref(), Some("hello bob"));
    assert!(session.messages()[0].is_from("alice@example.com"));
    assert_eq!(memory.messages(&thread()).len(), 1);
}

#[tokio::test]
async fn blank_text_is_not_sent() {
    let memory = MemoryBackend::new();
    let session = open(Backend::memory(memory.clone())).await;

    session.send_text("   ").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(memory.messages(&thread()).is_empty());
}

#[tokio::test]
async fn photo_is_uploaded_then_shown_with_its_bytes() {
    let memory = MemoryBackend::new();
    let mut session = open(Backend::memory(memory.clone())).await;

    session.send_photo(vec![0xff, 0xd8, 0xff]).unwrap();
    let notices = take_notices(&mut session, 4).await;

    assert!(matches!(notices[0], Notice::SendingPhoto(true)));
    assert!(notices.iter().any(|n| matches!(n, Notice::SendingPhoto(false))));
    assert!(notices.iter().any(|n| matches!(n, Notice::Sent)));
    assert!(!session.is_sending_photo());

    let shown = &session.messages()[0];
    assert!(shown.content.is_none());
    assert_eq!(shown.attachment_data.as_deref(), Some(&[0xff, 0xd8, 0xff][..]));
    // Bản lưu trên backend không giữ bytes.
    assert!(memory.messages(&thread())[0].attachment_data.is_none());
}

#[tokio::test]
async fn empty_photo_is_rejected_up_front() {
    let session = open(Backend::memory(MemoryBackend::new())).await;
    let err = session.send_photo(Vec::new()).unwrap_err();
    assert!(matches!(err, ChatError::AttachmentUpload(_)));
}

struct UnreachableStore;

#[async_trait]
impl AttachmentStore for UnreachableStore {
    async fn fetch(&self, reference: &AttachmentRef) -> Result<Vec<u8>> {
        Err(ChatError::fetch(reference, "storage offline"))
    }

    async fn upload(&self, _thread_id: &ThreadId, _data: Vec<u8>) -> Result<AttachmentRef> {
        Err(ChatError::AttachmentUpload("storage offline".to_string()))
    }
}

#[tokio::test]
async fn unresolvable_photo_is_reported_and_not_inserted() {
    let memory = MemoryBackend::new();
    let backend = Backend::new(
        Arc::new(memory.clone()),
        Arc::new(UnreachableStore),
        Arc::new(memory.clone()),
    );
    let mut session = open(backend).await;

    let mut photo = from_bob("p1", 10);
    photo.content = None;
    photo.attachment_ref = Some(AttachmentRef::new("https://cdn.example.com/p1.jpg"));
    memory.inject(&thread(), photo);
    memory.inject(&thread(), from_bob("t1", 20));

    match next_notice(&mut session).await {
        Notice::Failed(err) => {
            assert!(matches!(err, ChatError::AttachmentFetch { .. }));
            assert_eq!(err.title(), "Could not load image");
        }
        other => panic!("unexpected notice {other:?}"),
    }
    assert!(matches!(
        next_notice(&mut session).await,
        Notice::Inserted { .. }
    ));
    assert_eq!(ids(&session), ["t1"]);
}

#[tokio::test]
async fn failed_upload_reports_and_clears_the_photo_flag() {
    let memory = MemoryBackend::new();
    let backend = Backend::new(
        Arc::new(memory.clone()),
        Arc::new(UnreachableStore),
        Arc::new(memory.clone()),
    );
    let mut session = open(backend).await;

    session.send_photo(vec![1, 2, 3]).unwrap();
    let notices = take_notices(&mut session, 3).await;

    assert!(matches!(notices[0], Notice::SendingPhoto(true)));
    assert!(matches!(notices[1], Notice::SendingPhoto(false)));
    assert!(matches!(
        &notices[2],
        Notice::Failed(ChatError::AttachmentUpload(_))
    ));
    assert!(memory.messages(&thread()).is_empty());
}

#[tokio::test]
async fn subscription_error_keeps_existing_messages() {
    let memory = MemoryBackend::new();
    memory.inject(&thread(), from_bob("a", 10));
    let mut session = open(Backend::memory(memory.clone())).await;
    next_notice(&mut session).await;

    memory.fail_subscribers(&thread(), "listener lost");
    match next_notice(&mut session).await {
        Notice::Failed(err) => assert_eq!(err.title(), "Connection problem"),
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(ids(&session), ["a"]);
}

#[tokio::test]
async fn closing_or_dropping_releases_the_subscription() {
    let memory = MemoryBackend::new();

    let session = open(Backend::memory(memory.clone())).await;
    assert_eq!(memory.subscriber_count(&thread()), 1);
    session.close();
    assert_eq!(memory.subscriber_count(&thread()), 0);

    let session = open(Backend::memory(memory.clone())).await;
    assert_eq!(memory.subscriber_count(&thread()), 1);
    drop(session);
    assert_eq!(memory.subscriber_count(&thread()), 0);
}

struct RejectingSender;

#[async_trait]
impl MessageSender for RejectingSender {
    async fn send(&self, _thread_id: &ThreadId, _message: ChatMessage) -> Result<()> {
        Err(ChatError::Send("no peers on topic".to_string()))
    }
}

#[tokio::test]
async fn failed_send_leaves_the_thread_unchanged() {
    let memory = MemoryBackend::new();
    let backend = Backend::new(
        Arc::new(memory.clone()),
        Arc::new(memory.clone()),
        Arc::new(RejectingSender),
    );
    let mut session = open(backend).await;

    session.send_text("are you there?").unwrap();
    match next_notice(&mut session).await {
        Notice::Failed(err) => {
            assert!(matches!(err, ChatError::Send(_)));
            assert_eq!(err.title(), "Message not delivered");
        }
        other => panic!("unexpected notice {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        !session
            .poll()
            .iter()
            .any(|n| matches!(n, Notice::Sent | Notice::Inserted { .. }))
    );
    assert!(session.messages().is_empty());
    assert!(memory.messages(&thread()).is_empty());
}
