use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{Identity, MessageStore, NewMessage, StoredMessage};
use crate::error::IngestError;
use crate::websocket::{SendMessagePayload, ServerEvent, SessionRegistry};

/// Persists submitted messages and fans the stored record out.
pub struct IngestHandler {
    store: Arc<dyn MessageStore>,
    registry: Arc<SessionRegistry>,
    call_timeout: Duration,
    max_message_length: usize,
}

impl IngestHandler {
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<SessionRegistry>,
        call_timeout: Duration,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            registry,
            call_timeout,
            max_message_length,
        }
    }

    /// Stores the message, then broadcasts it. On any failure only the
    /// sender hears about it, through an `error` event.
    pub async fn handle(
        &self,
        session_id: Uuid,
        author: &Identity,
        payload: SendMessagePayload,
    ) -> Result<StoredMessage, IngestError> {
        match self.persist(author, payload).await {
            Ok(stored) => {
                if !self.registry.contains(&session_id).await {
                    debug!(
                        "Session {} left before message {} was stored",
                        session_id, stored.id
                    );
                }
                let delivered = self
                    .registry
                    .broadcast(ServerEvent::NewMessage(stored.clone()))
                    .await;
                info!(
                    message_id = stored.id,
                    delivered,
                    "Message from {}: {}",
                    author.username,
                    stored.text
                );
                Ok(stored)
            }
            Err(e) => {
                match &e {
                    IngestError::InvalidPayload(_) => {
                        warn!("Rejected message from {}: {}", author.username, e)
                    }
                    _ => error!("Error handling 'sendMessage' from {}: {:#}", author.username, e),
                }
                if !self
                    .registry
                    .send_to(&session_id, ServerEvent::Error(e.client_message()))
                    .await
                {
                    debug!("Session {} is gone; dropping error event", session_id);
                }
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        author: &Identity,
        payload: SendMessagePayload,
    ) -> Result<StoredMessage, IngestError> {
        let text = self.validate(payload)?;
        let record = NewMessage::new(text, author.id);

        timeout(self.call_timeout, self.store.create(record))
            .await
            .map_err(|_| IngestError::Timeout)?
            .map_err(IngestError::Persistence)
    }

    fn validate(&self, payload: SendMessagePayload) -> Result<String, IngestError> {
        let text = payload
            .text
            .ok_or_else(|| IngestError::InvalidPayload("Message text is required.".into()))?;

        if text.trim().is_empty() {
            return Err(IngestError::InvalidPayload(
                "Message text must not be empty.".into(),
            ));
        }
        if text.chars().count() > self.max_message_length {
            return Err(IngestError::InvalidPayload(format!(
                "Message text exceeds {} characters.",
                self.max_message_length
            )));
        }
        Ok(text)
    }
}
