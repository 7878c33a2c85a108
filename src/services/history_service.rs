use crate::adapters::store::{ConversationStore, Directory, MessageStore};
use crate::domain::conversation::Conversation;
use crate::domain::message::Message;
use crate::error::{AppError, Result};
use crate::services::projector::ConversationProjector;
use std::cmp::Reverse;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// One inbox row: a conversation and its current preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub conversation_id: Uuid,
    pub group_id: Option<Uuid>,
    pub peer_id: Option<Uuid>,
    pub last_message: Option<Message>,
}

/// Read paths over conversations. Every result honors the same eligibility rules as the
/// projector, even when the cached pointer is stale.
#[derive(Clone, Debug)]
pub struct HistoryService {
    directory: Arc<dyn Directory>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    projector: ConversationProjector,
}

impl HistoryService {
    #[must_use]
    pub fn new(
        directory: Arc<dyn Directory>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        projector: ConversationProjector,
    ) -> Self {
        Self { directory, conversations, messages, projector }
    }

    /// Lists the user's conversations, newest preview first.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the user does not exist.
    /// Returns `AppError::Database` if a store read fails.
    #[tracing::instrument(err(level = "warn"), skip(self, now))]
    pub async fn inbox(&self, user_id: Uuid, now: OffsetDateTime) -> Result<Vec<InboxEntry>> {
        self.directory.find_user(user_id).await?.ok_or(AppError::NotFound("user"))?;

        let mut entries = Vec::new();
        for conversation in self.conversations.list_for_user(user_id).await? {
            let last_message = self.preview(&conversation, now).await?;
            entries.push(InboxEntry {
                conversation_id: conversation.id(),
                group_id: conversation.participants.group_id(),
                peer_id: conversation.participants.peer_of(user_id),
                last_message,
            });
        }

        entries.sort_by_key(|entry| Reverse(entry.last_message.as_ref().map(|m| (m.effective_time(), m.id()))));
        Ok(entries)
    }

    /// Returns the cached preview if it is still eligible, otherwise recomputes and repairs it.
    async fn preview(&self, conversation: &Conversation, now: OffsetDateTime) -> Result<Option<Message>> {
        if let Some(id) = conversation.last_message_id()
            && let Some(message) = self.messages.find(id).await?
            && message.is_previewable_at(now)
        {
            return Ok(Some(message));
        }

        match self.projector.project(conversation.id(), now).await? {
            Some(id) => self.messages.find(id).await,
            None => Ok(None),
        }
    }

    /// Direct history between `user_id` and the user registered under `peer_email`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if either user does not exist.
    /// Returns `AppError::Database` if a store read fails.
    #[tracing::instrument(err(level = "warn"), skip(self, peer_email, now))]
    pub async fn direct_history(&self, user_id: Uuid, peer_email: &str, now: OffsetDateTime) -> Result<Vec<Message>> {
        self.directory.find_user(user_id).await?.ok_or(AppError::NotFound("user"))?;
        let peer = self.directory.find_user_by_email(peer_email).await?.ok_or(AppError::NotFound("peer"))?;

        match self.conversations.find_direct(user_id, peer.id()).await? {
            Some(conversation) => self.messages.history(conversation.id(), user_id, now).await,
            None => Ok(Vec::new()),
        }
    }

    /// Group history as seen by `user_id`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the group does not exist.
    /// Returns `AppError::Forbidden` if the user is not a member.
    /// Returns `AppError::Database` if a store read fails.
    #[tracing::instrument(err(level = "warn"), skip(self, now))]
    pub async fn group_history(&self, group_id: Uuid, user_id: Uuid, now: OffsetDateTime) -> Result<Vec<Message>> {
        let group = self.directory.find_group(group_id).await?.ok_or(AppError::NotFound("group"))?;
        if !group.is_member(user_id) {
            return Err(AppError::Forbidden);
        }

        match self.conversations.find_for_group(group_id).await? {
            Some(conversation) => self.messages.history(conversation.id(), user_id, now).await,
            None => Ok(Vec::new()),
        }
    }
}
