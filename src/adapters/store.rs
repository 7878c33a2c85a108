use crate::domain::conversation::Conversation;
use crate::domain::group::Group;
use crate::domain::message::{Message, NewMessage};
use crate::domain::user::User;
use crate::error::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Read-only view of users and groups owned by the account and group services.
#[async_trait]
pub trait Directory: Send + Sync + std::fmt::Debug {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Returns the group with its current members and admins, or `None` if it does not exist
    /// or has been deleted.
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync + std::fmt::Debug {
    /// Returns the single conversation for the unordered pair, creating it on first use.
    async fn find_or_create_direct(&self, a: Uuid, b: Uuid, now: OffsetDateTime) -> Result<Conversation>;

    /// Returns the group's conversation, creating it on first use. An existing conversation
    /// whose participant count has drifted from the group's membership is refreshed.
    async fn find_or_create_group(&self, group: &Group, now: OffsetDateTime) -> Result<Conversation>;

    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>>;

    async fn find_for_group(&self, group_id: Uuid) -> Result<Option<Conversation>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Points the conversation at its newest previewable message as of `now`, or clears the
    /// pointer, as one atomic step. Returns the pointer that was written.
    ///
    /// Previewable means not deleted, not scheduled in the future and not an expired burnout
    /// message, ranked by effective time with the id as tie-breaker.
    async fn refresh_last_message(&self, conversation_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>>;
}

/// Durable message rows. Conditional updates return the row only when their predicate still
/// held at write time, which serializes competing sweeps and timers.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    async fn insert(&self, message: NewMessage) -> Result<Message>;

    async fn find(&self, message_id: Uuid) -> Result<Option<Message>>;

    async fn mark_delivered(&self, message_id: Uuid) -> Result<()>;

    /// `is_scheduled AND scheduled_at <= now AND deleted_at IS NULL`, oldest first.
    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>>;

    /// `is_burnout AND expire_at <= now AND deleted_at IS NULL`, oldest first.
    async fn due_expired(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>>;

    /// Flips `is_scheduled` to false if the message is still pending, due and not deleted.
    async fn claim_scheduled(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>>;

    /// Stamps `deleted_at` if the message is a due burnout message that is not deleted yet.
    async fn expire(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>>;

    /// Replaces the body with `placeholder`, marks it edited and stamps `deleted_at`, unless
    /// the message is already deleted.
    async fn redact(&self, message_id: Uuid, placeholder: &str, now: OffsetDateTime) -> Result<Option<Message>>;

    /// Conversation history visible to `viewer`, oldest first.
    async fn history(&self, conversation_id: Uuid, viewer: Uuid, now: OffsetDateTime) -> Result<Vec<Message>>;
}
