use crate::adapters::database::DbPool;
use crate::adapters::database::records::MessageRecord;
use crate::adapters::database::records::message::MESSAGE_COLUMNS;
use crate::adapters::store::MessageStore;
use crate::domain::message::{Message, NewMessage};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>> {
        records.into_iter().map(Message::try_from).collect()
    }

    fn into_message(record: Option<MessageRecord>) -> Result<Option<Message>> {
        record.map(Message::try_from).transpose()
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    /// Records a new message.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if a referenced user, group or conversation does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, message), fields(message.id = %message.id))]
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        let sql = format!(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, recipient_id, group_id, body,
                 is_scheduled, scheduled_at, is_burnout, expire_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let result = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message.id)
            .bind(message.conversation_id)
            .bind(message.sender_id)
            .bind(message.destination.recipient_id())
            .bind(message.destination.group_id())
            .bind(&message.body)
            .bind(message.timing.is_scheduled())
            .bind(message.timing.scheduled_at)
            .bind(message.timing.is_burnout())
            .bind(message.timing.expire_at)
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                // Foreign key violation: a user, group or conversation vanished underneath us
                Err(AppError::NotFound("recipient"))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find(&self, message_id: Uuid) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let record = sqlx::query_as::<_, MessageRecord>(&sql).bind(message_id).fetch_optional(&self.pool).await?;
        Self::into_message(record)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn mark_delivered(&self, message_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE messages SET delivered = TRUE WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE is_scheduled
              AND scheduled_at <= $1
              AND deleted_at IS NULL
            ORDER BY scheduled_at ASC, id ASC
            LIMIT $2
            "#
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql).bind(now).bind(limit).fetch_all(&self.pool).await?;
        Self::into_messages(records)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn due_expired(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE is_burnout
              AND expire_at <= $1
              AND deleted_at IS NULL
            ORDER BY expire_at ASC, id ASC
            LIMIT $2
            "#
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql).bind(now).bind(limit).fetch_all(&self.pool).await?;
        Self::into_messages(records)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn claim_scheduled(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>> {
        let sql = format!(
            r#"
            UPDATE messages
            SET is_scheduled = FALSE
            WHERE id = $1
              AND is_scheduled
              AND scheduled_at <= $2
              AND deleted_at IS NULL
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record =
            sqlx::query_as::<_, MessageRecord>(&sql).bind(message_id).bind(now).fetch_optional(&self.pool).await?;
        Self::into_message(record)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn expire(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>> {
        let sql = format!(
            r#"
            UPDATE messages
            SET deleted_at = $2
            WHERE id = $1
              AND is_burnout
              AND expire_at <= $2
              AND deleted_at IS NULL
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record =
            sqlx::query_as::<_, MessageRecord>(&sql).bind(message_id).bind(now).fetch_optional(&self.pool).await?;
        Self::into_message(record)
    }

    #[tracing::instrument(level = "debug", skip(self, placeholder))]
    async fn redact(&self, message_id: Uuid, placeholder: &str, now: OffsetDateTime) -> Result<Option<Message>> {
        let sql = format!(
            r#"
            UPDATE messages
            SET body = $2, is_edited = TRUE, deleted_at = $3
            WHERE id = $1
              AND deleted_at IS NULL
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message_id)
            .bind(placeholder)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Self::into_message(record)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn history(&self, conversation_id: Uuid, viewer: Uuid, now: OffsetDateTime) -> Result<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
              AND deleted_at IS NULL
              AND (
                    (is_scheduled AND scheduled_at > $3 AND sender_id = $2)
                 OR (NOT (is_scheduled AND scheduled_at > $3) AND NOT (is_burnout AND expire_at <= $3))
              )
            ORDER BY COALESCE(scheduled_at, created_at) ASC, id ASC
            "#
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(conversation_id)
            .bind(viewer)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Self::into_messages(records)
    }
}
