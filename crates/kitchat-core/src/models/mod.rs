pub mod identity;
pub mod message;

pub use identity::{FriendsResponse, GroupRecord, IdentitySnapshot};
pub use message::{
    next_provisional_id, now_millis, CreateMessageRequest, CreateMessageResponse, Message,
    MessageBody, MessageRecord,
};
