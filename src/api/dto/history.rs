use crate::domain::message::Message;
use crate::services::history_service::InboxEntry;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A message as returned by the history endpoints. `time` is the effective time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub is_edited: bool,
    pub delivered: bool,
    pub is_scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    pub is_burnout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub expire_at: Option<OffsetDateTime>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            recipient_id: m.destination.recipient_id(),
            group_id: m.destination.group_id(),
            time: m.effective_time(),
            text: m.body,
            is_edited: m.is_edited,
            delivered: m.delivered,
            is_scheduled: m.is_scheduled,
            scheduled_at: m.scheduled_at,
            is_burnout: m.is_burnout,
            expire_at: m.expire_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntryView {
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<Uuid>,
    pub last_message: Option<MessageView>,
}

impl From<InboxEntry> for InboxEntryView {
    fn from(entry: InboxEntry) -> Self {
        Self {
            conversation_id: entry.conversation_id,
            group_id: entry.group_id,
            peer_id: entry.peer_id,
            last_message: entry.last_message.map(MessageView::from),
        }
    }
}
