//! Error type shared by the reconciler, the sessions and the backends.
//!
//! The first four variants are the user-visible failures of a thread view. They
//! are reported to the presentation layer and never retried here.

use thiserror::Error;

use crate::common::AttachmentRef;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to fetch attachment {reference}: {reason}")]
    AttachmentFetch {
        reference: AttachmentRef,
        reason: String,
    },

    #[error("failed to upload attachment: {0}")]
    AttachmentUpload(String),

    #[error("failed to send message: {0}")]
    Send(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is closed")]
    Closed(&'static str),
}

impl ChatError {
    pub fn fetch(reference: &AttachmentRef, reason: impl ToString) -> Self {
        Self::AttachmentFetch {
            reference: reference.clone(),
            reason: reason.to_string(),
        }
    }

    /// Heading shown above the error in the UI alert.
    pub fn title(&self) -> &'static str {
        match self {
            Self::AttachmentFetch { .. } => "Could not load image",
            Self::AttachmentUpload(_) => "Image not delivered",
            Self::Send(_) => "Message not delivered",
            Self::Subscription(_) => "Connection problem",
            _ => "Error!",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
