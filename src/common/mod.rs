pub mod commands;
pub mod events;
pub mod types;

pub use commands::{NodeCommand, OutboxCommand};
pub use events::{Notice, RemoteEvent};
pub use types::{AttachmentRef, ChatMessage, ThreadId, UserProfile};
