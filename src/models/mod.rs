pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{ConversationRow, ConversationView, LastMessage};
pub use message::{MessageRow, MessageView};
pub use user::{PresenceStatus, UserRow, UserSummary};
