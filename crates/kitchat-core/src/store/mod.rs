pub mod chat_store;
pub mod conversation_store;
pub mod unread_store;

pub use chat_store::ChatStore;
pub use conversation_store::{ConversationStore, IngestOutcome};
pub use unread_store::UnreadStore;
