use crate::adapters::database::DbPool;
use crate::adapters::database::records::ConversationRecord;
use crate::adapters::database::records::conversation::CONVERSATION_COLUMNS;
use crate::adapters::store::ConversationStore;
use crate::domain::conversation::{Conversation, Participants};
use crate::domain::group::Group;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ConversationRepository {
    pool: DbPool,
}

impl ConversationRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_or_create_direct(&self, a: Uuid, b: Uuid, now: OffsetDateTime) -> Result<Conversation> {
        let Participants::Direct { pair: [low, high] } = Participants::direct(a, b) else {
            return Err(AppError::Internal);
        };

        // Concurrent first sends race on the partial unique index; the loser reads the winner's row.
        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, participants, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (participant_low, participant_high) WHERE group_id IS NULL DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(low)
        .bind(high)
        .bind(vec![low, high])
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_direct(low, high).await?.ok_or(AppError::Internal)
    }

    #[tracing::instrument(level = "debug", skip(self, group), fields(group.id = %group.id))]
    async fn find_or_create_group(&self, group: &Group, now: OffsetDateTime) -> Result<Conversation> {
        let sql = format!(
            r#"
            INSERT INTO conversations (id, group_id, participants, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (group_id) DO UPDATE
                SET participants = EXCLUDED.participants, updated_at = EXCLUDED.updated_at
                WHERE cardinality(conversations.participants) <> cardinality(EXCLUDED.participants)
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );

        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(Uuid::now_v7())
            .bind(group.id)
            .bind(&group.members)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) => record.try_into(),
            // Conflict without drift: nothing was written, read the existing row.
            None => self.find_for_group(group.id).await?.ok_or(AppError::Internal),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        let record =
            sqlx::query_as::<_, ConversationRecord>(&sql).bind(conversation_id).fetch_optional(&self.pool).await?;
        record.map(Conversation::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let Participants::Direct { pair: [low, high] } = Participants::direct(a, b) else {
            return Ok(None);
        };
        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE group_id IS NULL AND participant_low = $1 AND participant_high = $2
            "#
        );
        let record =
            sqlx::query_as::<_, ConversationRecord>(&sql).bind(low).bind(high).fetch_optional(&self.pool).await?;
        record.map(Conversation::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_for_group(&self, group_id: Uuid) -> Result<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE group_id = $1");
        let record =
            sqlx::query_as::<_, ConversationRecord>(&sql).bind(group_id).fetch_optional(&self.pool).await?;
        record.map(Conversation::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE $1 = ANY(participants)
            ORDER BY id ASC
            "#
        );
        let records = sqlx::query_as::<_, ConversationRecord>(&sql).bind(user_id).fetch_all(&self.pool).await?;
        records.into_iter().map(Conversation::try_from).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn refresh_last_message(&self, conversation_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        // Lock first so the recompute below reads a snapshot taken after any earlier refresh of
        // this row committed.
        sqlx::query("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        let last_message_id = sqlx::query_scalar::<_, Option<Uuid>>(
            r#"
            UPDATE conversations
            SET updated_at = $2,
                last_message_id = (
                    SELECT id
                    FROM messages
                    WHERE conversation_id = $1
                      AND deleted_at IS NULL
                      AND NOT (is_scheduled AND scheduled_at > $2)
                      AND NOT (is_burnout AND expire_at <= $2)
                    ORDER BY COALESCE(scheduled_at, created_at) DESC, id DESC
                    LIMIT 1
                )
            WHERE id = $1
            RETURNING last_message_id
            "#,
        )
        .bind(conversation_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(last_message_id.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::message_repo::MessageRepository;
    use crate::adapters::database::testing::{add_member, now, seed_group, seed_user, test_pool};
    use crate::adapters::store::MessageStore;
    use crate::domain::message::{DeliveryTiming, Destination, NewMessage};
    use time::Duration;

    #[tokio::test]
    async fn direct_conversation_is_unique_per_unordered_pair() {
        let Some(pool) = test_pool().await else { return };
        let repo = ConversationRepository::new(pool.clone());
        let (a, b) = (seed_user(&pool).await, seed_user(&pool).await);

        let first = repo.find_or_create_direct(a, b, now()).await.expect("create");
        let second = repo.find_or_create_direct(b, a, now()).await.expect("reuse");

        assert_eq!(first.id, second.id);
        assert_eq!(repo.find_direct(b, a).await.expect("find").map(|c| c.id), Some(first.id));
        let listed: Vec<_> = repo.list_for_user(a).await.expect("list").into_iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![first.id]);
    }

    #[tokio::test]
    async fn concurrent_first_sends_share_one_direct_conversation() {
        let Some(pool) = test_pool().await else { return };
        let repo = ConversationRepository::new(pool.clone());
        let (a, b) = (seed_user(&pool).await, seed_user(&pool).await);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
                tokio::spawn(async move { repo.find_or_create_direct(x, y, now()).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.expect("join").expect("create").id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn group_conversation_refreshes_drifted_membership() {
        let Some(pool) = test_pool().await else { return };
        let repo = ConversationRepository::new(pool.clone());
        let creator = seed_user(&pool).await;
        let mut group = seed_group(&pool, creator, &[]).await;

        let first = repo.find_or_create_group(&group, now()).await.expect("create");
        assert_eq!(first.participants.members(), &[creator]);

        let unchanged = repo.find_or_create_group(&group, now()).await.expect("reuse");
        assert_eq!(unchanged, first);

        let newcomer = seed_user(&pool).await;
        add_member(&pool, group.id, newcomer).await;
        group.members.push(newcomer);
        let refreshed = repo.find_or_create_group(&group, now()).await.expect("refresh");

        assert_eq!(refreshed.id, first.id);
        assert!(refreshed.participants.contains(newcomer));
        assert_eq!(repo.find_for_group(group.id).await.expect("find"), Some(refreshed));
    }

    #[tokio::test]
    async fn refresh_of_an_unknown_conversation_writes_nothing() {
        let Some(pool) = test_pool().await else { return };
        let repo = ConversationRepository::new(pool);
        assert_eq!(repo.refresh_last_message(Uuid::new_v4(), now()).await.expect("refresh"), None);
    }

    #[tokio::test]
    async fn concurrent_refreshes_never_restore_a_deleted_message() {
        let Some(pool) = test_pool().await else { return };
        let conversations = ConversationRepository::new(pool.clone());
        let messages = MessageRepository::new(pool.clone());
        let (sender, recipient) = (seed_user(&pool).await, seed_user(&pool).await);
        let now = now();
        let conversation = conversations.find_or_create_direct(sender, recipient, now).await.expect("conversation");
        let conversation_id = conversation.id;

        let mut ids = Vec::new();
        for created_at in [now - Duration::seconds(5), now] {
            let message = NewMessage::new(
                conversation_id,
                sender,
                Destination::Direct { recipient_id: recipient },
                "hello".to_string(),
                DeliveryTiming::default(),
                created_at,
            );
            ids.push(messages.insert(message).await.expect("insert").id);
        }
        let (older, newest) = (ids[0], ids[1]);
        conversations.refresh_last_message(conversation_id, now).await.expect("refresh");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let conversations = conversations.clone();
                tokio::spawn(async move { conversations.refresh_last_message(conversation_id, now).await })
            })
            .collect();
        messages.redact(newest, "message deleted", now).await.expect("redact").expect("row");
        conversations.refresh_last_message(conversation_id, now).await.expect("refresh after delete");

        for task in tasks {
            task.await.expect("join").expect("refresh");
        }
        let stored = conversations.find(conversation_id).await.expect("find").expect("row");
        assert_eq!(stored.last_message_id, Some(older));
    }
}
