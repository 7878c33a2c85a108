use crate::domain::user::User;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) created_at: Option<OffsetDateTime>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self { id: record.id, email: record.email, full_name: record.full_name, created_at: record.created_at }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct GroupRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) creator_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
pub struct GroupMemberRecord {
    pub(crate) user_id: Uuid,
    pub(crate) is_admin: bool,
}
