use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::db::models::{Identity, NewMessage, StoredMessage, StoredMessageRow};
use crate::db::{IdentityResolver, MessageStore};
use crate::error::AppError;

const FETCH_IDENTITY: &str = "SELECT id, username FROM users WHERE id = $1";

const INSERT_MESSAGE: &str = r#"
    WITH inserted AS (
        INSERT INTO messages (text, author_id, created_at, published_at)
        VALUES ($1, $2, NOW(), $3)
        RETURNING id, text, author_id, created_at, published_at
    )
    SELECT inserted.id, inserted.text, users.id AS author_id, users.username AS author_username,
           inserted.created_at, inserted.published_at
    FROM inserted
    JOIN users ON users.id = inserted.author_id
"#;

/// Postgres-backed identity lookup and message storage. Works against the
/// host's `users` and `messages` tables; it does not own or migrate them.
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;

        info!(
            "Database pool ready (min {}, max {} connections)",
            config.min_connections, config.max_connections
        );
        Ok(Self::new(Arc::new(pool)))
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        Ok(self.pool.as_ref().begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IdentityResolver for DbOperations {
    async fn fetch(&self, subject_id: i64) -> anyhow::Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(FETCH_IDENTITY)
            .bind(subject_id)
            .fetch_optional(self.pool.as_ref())
            .await
            .with_context(|| format!("failed to look up user {}", subject_id))?;

        Ok(identity)
    }
}

#[async_trait]
impl MessageStore for DbOperations {
    async fn create(&self, record: NewMessage) -> anyhow::Result<StoredMessage> {
        let mut transaction = self.begin_transaction().await?;

        let result = sqlx::query_as::<_, StoredMessageRow>(INSERT_MESSAGE)
            .bind(&record.text)
            .bind(record.author_id)
            .bind(record.published_at)
            .fetch_optional(&mut *transaction)
            .await;

        let failure = match result {
            Ok(Some(row)) => {
                transaction.commit().await?;
                return Ok(row.into());
            }
            // The join came back empty: the author row is gone.
            Ok(None) => anyhow::anyhow!("author {} does not exist", record.author_id),
            Err(e) => anyhow::Error::new(e).context("failed to insert message"),
        };

        Err(keep_failure(transaction.rollback().await, failure))
    }
}

/// Returns the original failure; a rollback error is only logged.
fn keep_failure(rollback: Result<(), sqlx::Error>, failure: anyhow::Error) -> anyhow::Error {
    if let Err(e) = rollback {
        warn!("Rollback after failed insert also failed: {}", e);
    }
    failure
}
