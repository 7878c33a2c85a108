use crate::domain::conversation::{Conversation, Participants};
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) const CONVERSATION_COLUMNS: &str =
    "id, group_id, participant_low, participant_high, participants, last_message_id, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) group_id: Option<Uuid>,
    pub(crate) participant_low: Option<Uuid>,
    pub(crate) participant_high: Option<Uuid>,
    pub(crate) participants: Vec<Uuid>,
    pub(crate) last_message_id: Option<Uuid>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = AppError;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        let participants = match (record.group_id, record.participant_low, record.participant_high) {
            (Some(group_id), None, None) => Participants::Group { group_id, members: record.participants },
            (None, Some(low), Some(high)) => Participants::direct(low, high),
            _ => {
                tracing::error!(conversation.id = %record.id, "Conversation row is neither direct nor group");
                return Err(AppError::Internal);
            }
        };

        Ok(Self {
            id: record.id,
            participants,
            last_message_id: record.last_message_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
