pub mod contact;
pub mod conversation;
pub mod message;
pub mod presence;

pub use contact::ContactService;
pub use conversation::ConversationService;
pub use message::MessageService;
pub use presence::PresenceService;
