pub mod conversation_repo;
pub mod directory_repo;
pub mod message_repo;
pub mod records;

use crate::config::DatabaseConfig;
use backon::{ExponentialBuilder, Retryable};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool, retrying with exponential backoff while the
/// database is still coming up.
///
/// # Errors
/// Returns `sqlx::Error` if every connect attempt fails.
pub async fn init_pool(config: &DatabaseConfig, url: &str) -> Result<DbPool, sqlx::Error> {
    let options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs));

    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(config.connect_min_backoff_secs))
        .with_max_delay(Duration::from_secs(config.connect_max_backoff_secs))
        .with_max_times(config.connect_attempts);

    (|| async { options.clone().connect(url).await })
        .retry(backoff)
        .notify(|err: &sqlx::Error, dur: Duration| {
            tracing::warn!(error = %err, retry_in = ?dur, "Database not reachable, retrying");
        })
        .await
}

#[cfg(test)]
pub(crate) mod testing;
