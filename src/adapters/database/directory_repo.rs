use crate::adapters::database::DbPool;
use crate::adapters::database::records::{GroupMemberRecord, GroupRecord, UserRecord};
use crate::adapters::store::Directory;
use crate::domain::group::Group;
use crate::domain::user::User;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Reads the user and group tables. Rows are written by the account and group services.
#[derive(Clone, Debug)]
pub struct DirectoryRepository {
    pool: DbPool,
}

impl DirectoryRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for DirectoryRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let record =
            sqlx::query_as::<_, UserRecord>("SELECT id, email, full_name, created_at FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self, email))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let record =
            sqlx::query_as::<_, UserRecord>("SELECT id, email, full_name, created_at FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>> {
        let Some(group) = sqlx::query_as::<_, GroupRecord>(
            "SELECT id, name, creator_id FROM groups WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let members = sqlx::query_as::<_, GroupMemberRecord>(
            "SELECT user_id, is_admin FROM group_members WHERE group_id = $1 ORDER BY joined_at ASC, user_id ASC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        let admins = members.iter().filter(|m| m.is_admin).map(|m| m.user_id).collect();
        let members = members.into_iter().map(|m| m.user_id).collect();

        Ok(Some(Group::new(group.id, group.name, group.creator_id, members, admins)))
    }
}
