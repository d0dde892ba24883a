use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::Identity;
use crate::websocket::ServerEvent;

struct Member {
    identity: Identity,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Authenticated, live sessions keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    members: RwLock<HashMap<Uuid, Member>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the session was already registered; the existing
    /// entry is kept.
    pub async fn add(
        &self,
        id: Uuid,
        identity: Identity,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> bool {
        let mut members = self.members.write().await;
        if members.contains_key(&id) {
            debug!("Session {} is already registered", id);
            return false;
        }
        info!("Added session {} ({}) to registry", id, identity.username);
        members.insert(id, Member { identity, sender });
        true
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Identity> {
        let removed = self.members.write().await.remove(id).map(|m| m.identity);
        if let Some(identity) = &removed {
            info!("Removed session {} ({}) from registry", id, identity.username);
        }
        removed
    }

    /// Delivers `event` to every member, the originator included. Returns the
    /// number of members that accepted it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let snapshot: Vec<(Uuid, mpsc::UnboundedSender<ServerEvent>)> = self
            .members
            .read()
            .await
            .iter()
            .map(|(id, member)| (*id, member.sender.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in snapshot {
            match sender.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Skipping unreachable session {} during broadcast", id),
            }
        }
        delivered
    }

    pub async fn send_to(&self, id: &Uuid, event: ServerEvent) -> bool {
        let sender = match self.members.read().await.get(id) {
            Some(member) => member.sender.clone(),
            None => return false,
        };
        sender.send(event).is_ok()
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.members.read().await.contains_key(id)
    }

    pub async fn identity_of(&self, id: &Uuid) -> Option<Identity> {
        self.members.read().await.get(id).map(|m| m.identity.clone())
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<Uuid> {
        self.members.read().await.keys().cloned().collect()
    }
}
