use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Profile snapshot attached to a connection when it authenticates.
/// It is never refreshed for the lifetime of that connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub id: i64,
    pub username: String,
}

impl Identity {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// A message as submitted, before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub author_id: i64,
    pub published_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(text: String, author_id: i64) -> Self {
        Self {
            text,
            author_id,
            published_at: Utc::now(),
        }
    }
}

/// The persisted record, with its author resolved. This is the only form
/// of a message that is ever broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub text: String,
    pub author: Identity,
    pub created_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
}

/// Flat row returned by the insert-and-join query.
#[derive(Debug, FromRow)]
pub(crate) struct StoredMessageRow {
    pub id: i64,
    pub text: String,
    pub author_id: i64,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
}

impl From<StoredMessageRow> for StoredMessage {
    fn from(row: StoredMessageRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            author: Identity::new(row.author_id, row.author_username),
            created_at: row.created_at,
            published_at: row.published_at,
        }
    }
}
