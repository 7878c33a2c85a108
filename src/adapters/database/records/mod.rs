pub mod conversation;
pub mod directory;
pub mod message;

pub use conversation::ConversationRecord;
pub use directory::{GroupMemberRecord, GroupRecord, UserRecord};
pub use message::MessageRecord;
