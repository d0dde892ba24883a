use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::models::{Identity, NewMessage, StoredMessage};
use crate::db::{IdentityResolver, MessageStore};

/// User directory kept in process memory.
#[derive(Default)]
pub struct InMemoryUsers {
    users: RwLock<HashMap<i64, Identity>>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity) {
        self.users.write().await.insert(identity.id, identity);
    }

    pub async fn remove(&self, id: i64) -> Option<Identity> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl IdentityResolver for InMemoryUsers {
    async fn fetch(&self, subject_id: i64) -> anyhow::Result<Option<Identity>> {
        Ok(self.users.read().await.get(&subject_id).cloned())
    }
}

/// Message log kept in process memory. Ids start at 1 and increase.
pub struct InMemoryMessages {
    users: Arc<InMemoryUsers>,
    messages: RwLock<Vec<StoredMessage>>,
    sequence: AtomicI64,
}

impl InMemoryMessages {
    pub fn new(users: Arc<InMemoryUsers>) -> Self {
        Self {
            users,
            messages: RwLock::new(Vec::new()),
            sequence: AtomicI64::new(0),
        }
    }

    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessages {
    async fn create(&self, record: NewMessage) -> anyhow::Result<StoredMessage> {
        let author = self
            .users
            .fetch(record.author_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("author {} does not exist", record.author_id))?;

        let stored = StoredMessage {
            id: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            text: record.text,
            author,
            created_at: Utc::now(),
            published_at: record.published_at,
        };
        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }
}
