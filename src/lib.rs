//! Chat client core: a reconciler that keeps one thread's messages ordered and
//! deduplicated, thread sessions that feed it from a backend, and the egui
//! screens on top.

pub mod backend;
pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod reconciler;
pub mod session;
pub mod storage;
pub mod ui;

pub use backend::{Backend, MemoryBackend};
pub use common::{ChatMessage, Notice, ThreadId, UserProfile};
pub use error::{ChatError, Result};
pub use reconciler::{InsertOutcome, ThreadState, should_auto_scroll};
pub use session::ThreadSession;
