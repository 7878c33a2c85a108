use crate::adapters::store::{ConversationStore, Directory, MessageStore};
use crate::domain::conversation::{Conversation, Participants};
use crate::domain::group::Group;
use crate::domain::message::{Message, NewMessage};
use crate::domain::user::User;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Message>,
}

/// Process-local implementation of every store contract. Used by tests and by database-less
/// local runs; state is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user in the directory.
    pub fn insert_user(&self, user: User) {
        self.state.lock().users.insert(user.id, user);
    }

    /// Adds or replaces a group, including its membership.
    pub fn insert_group(&self, group: Group) {
        self.state.lock().groups.insert(group.id, group);
    }

    pub fn remove_user(&self, user_id: Uuid) {
        self.state.lock().users.remove(&user_id);
    }

    fn sorted_by_effective_time(mut messages: Vec<Message>) -> Vec<Message> {
        messages.sort_by_key(|m| (m.effective_time(), m.id));
        messages
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.state.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>> {
        Ok(self.state.lock().groups.get(&group_id).cloned())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_or_create_direct(&self, a: Uuid, b: Uuid, now: OffsetDateTime) -> Result<Conversation> {
        let participants = Participants::direct(a, b);
        let mut state = self.state.lock();
        if let Some(existing) = state.conversations.values().find(|c| c.participants == participants) {
            return Ok(existing.clone());
        }
        let conversation = Conversation::new(participants, now);
        state.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_or_create_group(&self, group: &Group, now: OffsetDateTime) -> Result<Conversation> {
        let mut state = self.state.lock();
        let existing = state.conversations.values_mut().find(|c| c.participants.group_id() == Some(group.id));

        if let Some(conversation) = existing {
            if conversation.participants.members().len() != group.members.len() {
                conversation.participants = Participants::Group { group_id: group.id, members: group.members.clone() };
                conversation.updated_at = now;
            }
            return Ok(conversation.clone());
        }

        let conversation =
            Conversation::new(Participants::Group { group_id: group.id, members: group.members.clone() }, now);
        state.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state.lock().conversations.get(&conversation_id).cloned())
    }

    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let participants = Participants::direct(a, b);
        Ok(self.state.lock().conversations.values().find(|c| c.participants == participants).cloned())
    }

    async fn find_for_group(&self, group_id: Uuid) -> Result<Option<Conversation>> {
        let state = self.state.lock();
        Ok(state.conversations.values().find(|c| c.participants.group_id() == Some(group_id)).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let state = self.state.lock();
        let mut conversations: Vec<_> =
            state.conversations.values().filter(|c| c.participants.contains(user_id)).cloned().collect();
        conversations.sort_by_key(|c| c.id);
        Ok(conversations)
    }

    async fn refresh_last_message(&self, conversation_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>> {
        let mut state = self.state.lock();
        let latest = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && m.is_previewable_at(now))
            .max_by_key(|m| (m.effective_time(), m.id))
            .map(|m| m.id);

        let Some(conversation) = state.conversations.get_mut(&conversation_id) else {
            return Ok(None);
        };
        conversation.last_message_id = latest;
        conversation.updated_at = now;
        Ok(latest)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        let message = message.into_message();
        self.state.lock().messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find(&self, message_id: Uuid) -> Result<Option<Message>> {
        Ok(self.state.lock().messages.get(&message_id).cloned())
    }

    async fn mark_delivered(&self, message_id: Uuid) -> Result<()> {
        if let Some(message) = self.state.lock().messages.get_mut(&message_id) {
            message.delivered = true;
        }
        Ok(())
    }

    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>> {
        let state = self.state.lock();
        let mut due: Vec<_> = state
            .messages
            .values()
            .filter(|m| m.is_scheduled && m.deleted_at.is_none() && m.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|m| (m.scheduled_at, m.id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn due_expired(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>> {
        let state = self.state.lock();
        let mut due: Vec<_> = state
            .messages
            .values()
            .filter(|m| m.is_burnout && m.deleted_at.is_none() && m.expire_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|m| (m.expire_at, m.id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn claim_scheduled(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>> {
        let mut state = self.state.lock();
        let Some(message) = state.messages.get_mut(&message_id) else {
            return Ok(None);
        };
        let due =
            message.is_scheduled && message.deleted_at.is_none() && message.scheduled_at.is_some_and(|at| at <= now);
        if !due {
            return Ok(None);
        }
        message.is_scheduled = false;
        Ok(Some(message.clone()))
    }

    async fn expire(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>> {
        let mut state = self.state.lock();
        let Some(message) = state.messages.get_mut(&message_id) else {
            return Ok(None);
        };
        let due = message.is_burnout && message.deleted_at.is_none() && message.expire_at.is_some_and(|at| at <= now);
        if !due {
            return Ok(None);
        }
        message.deleted_at = Some(now);
        Ok(Some(message.clone()))
    }

    async fn redact(&self, message_id: Uuid, placeholder: &str, now: OffsetDateTime) -> Result<Option<Message>> {
        let mut state = self.state.lock();
        let Some(message) = state.messages.get_mut(&message_id) else {
            return Ok(None);
        };
        if message.deleted_at.is_some() {
            return Ok(None);
        }
        placeholder.clone_into(&mut message.body);
        message.is_edited = true;
        message.deleted_at = Some(now);
        Ok(Some(message.clone()))
    }

    async fn history(&self, conversation_id: Uuid, viewer: Uuid, now: OffsetDateTime) -> Result<Vec<Message>> {
        let visible: Vec<_> = {
            let state = self.state.lock();
            state
                .messages
                .values()
                .filter(|m| m.conversation_id == conversation_id && m.is_visible_to(viewer, now))
                .cloned()
                .collect()
        };
        Ok(Self::sorted_by_effective_time(visible))
    }
}
