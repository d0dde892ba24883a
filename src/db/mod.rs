//! Persistence seams for the gateway
//!
//! The hosting process owns the user directory and the message table. The
//! gateway only talks to them through [`IdentityResolver`] and
//! [`MessageStore`]; a Postgres implementation and an in-memory one ship
//! with the crate.

pub mod memory;
pub mod models;
pub mod operations;

use async_trait::async_trait;

pub use memory::{InMemoryMessages, InMemoryUsers};
pub use models::{Identity, NewMessage, StoredMessage};
pub use operations::DbOperations;

/// Resolves the subject of a verified token to a profile.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means the subject has no profile.
    async fn fetch(&self, subject_id: i64) -> anyhow::Result<Option<Identity>>;
}

/// Durable message storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists `record` and returns the stored form with its author resolved.
    async fn create(&self, record: NewMessage) -> anyhow::Result<StoredMessage>;
}
