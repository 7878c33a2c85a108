use crate::domain::message::{Destination, Message};
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, group_id, body, is_edited, \
     delivered, is_scheduled, scheduled_at, is_burnout, expire_at, deleted_at, created_at";

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) recipient_id: Option<Uuid>,
    pub(crate) group_id: Option<Uuid>,
    pub(crate) body: String,
    pub(crate) is_edited: bool,
    pub(crate) delivered: bool,
    pub(crate) is_scheduled: bool,
    pub(crate) scheduled_at: Option<OffsetDateTime>,
    pub(crate) is_burnout: bool,
    pub(crate) expire_at: Option<OffsetDateTime>,
    pub(crate) deleted_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let Some(destination) = Destination::from_columns(record.recipient_id, record.group_id) else {
            tracing::error!(message.id = %record.id, "Message row has no single destination");
            return Err(AppError::Internal);
        };

        Ok(Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            destination,
            body: record.body,
            is_edited: record.is_edited,
            delivered: record.delivered,
            is_scheduled: record.is_scheduled,
            scheduled_at: record.scheduled_at,
            is_burnout: record.is_burnout,
            expire_at: record.expire_at,
            deleted_at: record.deleted_at,
            created_at: record.created_at,
        })
    }
}
