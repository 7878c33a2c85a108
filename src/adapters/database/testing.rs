//! Postgres fixtures for repository tests. Tests skip themselves when `DATABASE_URL` is unset.

use crate::adapters::database::{DbPool, init_pool};
use crate::config::DatabaseConfig;
use crate::domain::group::Group;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) async fn test_pool() -> Option<DbPool> {
    crate::telemetry::init_test_telemetry();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let pool = init_pool(&DatabaseConfig::default(), &database_url)
        .await
        .expect("Failed to connect to DB. Is Postgres running?");
    sqlx::migrate!().run(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

/// Current time at the microsecond precision Postgres stores.
pub(crate) fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_microsecond(now.microsecond()).expect("valid microsecond")
}

pub(crate) async fn seed_user(pool: &DbPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, full_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind("Test User")
        .execute(pool)
        .await
        .expect("seed user");
    id
}

/// Creates a group led by `creator` whose other members are `others`.
pub(crate) async fn seed_group(pool: &DbPool, creator: Uuid, others: &[Uuid]) -> Group {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO groups (id, name, creator_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind("test group")
        .bind(creator)
        .execute(pool)
        .await
        .expect("seed group");

    let mut members = vec![creator];
    members.extend_from_slice(others);
    for member in &members {
        add_member(pool, id, *member).await;
    }
    Group::new(id, "test group", creator, members, vec![])
}

pub(crate) async fn add_member(pool: &DbPool, group_id: Uuid, user_id: Uuid) {
    sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES ($1, $2)")
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("seed member");
}
