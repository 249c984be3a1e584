use std::sync::LazyLock;

use regex::Regex;

use crate::common::{Notice, ThreadId, UserProfile};
use crate::error::ChatError;
use crate::reconciler::should_auto_scroll;
use crate::session::ThreadSession;

use super::components::photo::PhotoCache;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Form đăng nhập. Mật khẩu không được kiểm tra.
#[derive(Debug, Default)]
pub struct LoginState {
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub friend_id: String,
    pub error: Option<String>,
}

/// Who logged in and which thread to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub profile: UserProfile,
    pub friend_id: String,
    pub thread_id: ThreadId,
}

impl LoginState {
    pub fn is_ready(&self) -> bool {
        EMAIL_PATTERN.is_match(self.email.trim()) && !self.friend_id.trim().is_empty()
    }

    pub fn submit(&self) -> Result<LoginRequest, String> {
        let email = self.email.trim();
        if !EMAIL_PATTERN.is_match(email) {
            return Err("Enter a valid email".to_string());
        }
        let friend = self.friend_id.trim();
        if friend.is_empty() {
            return Err("Enter who you want to chat with".to_string());
        }
        if friend == email {
            return Err("Pick someone other than yourself".to_string());
        }

        let display_name = match self.display_name.trim() {
            "" => email.split('@').next().unwrap_or(email).to_string(),
            name => name.to_string(),
        };

        Ok(LoginRequest {
            profile: UserProfile {
                id: email.to_string(),
                display_name,
            },
            friend_id: friend.to_string(),
            thread_id: ThreadId::between(email, friend),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl From<&ChatError> for Alert {
    fn from(err: &ChatError) -> Self {
        Self {
            title: err.title().to_string(),
            message: err.to_string(),
        }
    }
}

/// Trạng thái cục bộ của màn hình chat.
pub struct ThreadViewState {
    pub session: ThreadSession,
    pub friend_id: String,
    pub input_text: String,
    pub photo_path: String,
    /// Measured on the previous frame by the message list.
    pub viewer_at_bottom: bool,
    pub scroll_to_bottom: bool,
    pub alert: Option<Alert>,
    pub photos: PhotoCache,
    /// Set as soon as a photo is queued, before the outbox reports the upload.
    photo_pending: bool,
}

impl ThreadViewState {
    pub fn new(session: ThreadSession, friend_id: String) -> Self {
        Self {
            session,
            friend_id,
            input_text: String::new(),
            photo_path: String::new(),
            viewer_at_bottom: true,
            scroll_to_bottom: true,
            alert: None,
            photos: PhotoCache::default(),
            photo_pending: false,
        }
    }

    pub fn handle_notices(&mut self) {
        for notice in self.session.poll() {
            match notice {
                Notice::Inserted { is_newest, .. } => {
                    if should_auto_scroll(is_newest, self.viewer_at_bottom) {
                        self.scroll_to_bottom = true;
                    }
                }
                Notice::SendingPhoto(false) => self.photo_pending = false,
                Notice::Duplicate { .. } | Notice::SendingPhoto(true) => {}
                Notice::Failed(err) => self.alert = Some(Alert::from(&err)),
                Notice::Sent => self.scroll_to_bottom = true,
            }
        }
    }

    pub fn send_text(&mut self, text: String) {
        if let Err(err) = self.session.send_text(&text) {
            self.alert = Some(Alert::from(&err));
        }
    }

    pub fn is_uploading_photo(&self) -> bool {
        self.photo_pending || self.session.is_sending_photo()
    }

    pub fn attach_photo(&mut self, path: String) {
        if self.is_uploading_photo() {
            log::debug!("Ignoring {path}: a photo is already uploading");
            return;
        }

        let result = std::fs::read(path.trim())
            .map_err(ChatError::from)
            .and_then(|data| self.session.send_photo(data));
        match result {
            Ok(()) => self.photo_pending = true,
            Err(err) => {
                log::warn!("Could not send photo {path}: {err}");
                self.alert = Some(Alert::from(&err));
            }
        }
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }
}
