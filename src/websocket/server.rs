use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{ConnectionAuthenticator, CredentialVerifier, Handshake};
use crate::config::GatewayConfig;
use crate::db::{Identity, IdentityResolver, MessageStore, StoredMessage};
use crate::error::{AppError, AuthError, IngestError};
use crate::websocket::{
    Connection, IngestHandler, SendMessagePayload, ServerEvent, SessionRegistry, WebSocketSession,
};

/// Server-initiated broadcast capability. Built once by the [`Gateway`] and
/// handed to whichever component needs to push events.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.registry.broadcast(event).await
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }
}

/// Liveness settings each socket actor runs with.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    pub interval: Duration,
    pub client_timeout: Duration,
}

/// Wires authentication, the registry and message ingest together.
pub struct Gateway {
    authenticator: ConnectionAuthenticator,
    registry: Arc<SessionRegistry>,
    ingest: IngestHandler,
    heartbeat: Heartbeat,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        verifier: Arc<dyn CredentialVerifier>,
        resolver: Arc<dyn IdentityResolver>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            authenticator: ConnectionAuthenticator::new(verifier, resolver, config.call_timeout()),
            ingest: IngestHandler::new(
                store,
                registry.clone(),
                config.call_timeout(),
                config.max_message_length,
            ),
            registry,
            heartbeat: Heartbeat {
                interval: config.heartbeat_interval(),
                client_timeout: config.client_timeout(),
            },
        }
    }

    pub async fn authenticate(&self, handshake: &Handshake) -> Result<Connection, AuthError> {
        self.authenticator.authenticate(handshake).await
    }

    /// Registers an authenticated connection. A connection without an
    /// identity is refused and must be dropped by the caller.
    pub async fn admit(
        &self,
        connection: &Connection,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<(), AppError> {
        let identity = match connection.identity() {
            Some(identity) if connection.is_authenticated() => identity.clone(),
            _ => {
                error!(
                    "Socket {} connected without authenticated user state.",
                    connection.id()
                );
                return Err(AppError::InvariantViolation(format!(
                    "session {} has no authenticated identity",
                    connection.id()
                )));
            }
        };

        self.registry.add(connection.id(), identity, sender).await;
        Ok(())
    }

    pub async fn ingest(
        &self,
        session_id: Uuid,
        author: &Identity,
        payload: SendMessagePayload,
    ) -> Result<StoredMessage, IngestError> {
        self.ingest.handle(session_id, author, payload).await
    }

    pub async fn disconnect(&self, session_id: &Uuid) -> bool {
        match self.registry.remove(session_id).await {
            Some(identity) => {
                info!("Socket disconnected: {} ({})", identity.username, session_id);
                true
            }
            None => false,
        }
    }

    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            registry: self.registry.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat
    }
}

/// Authenticates the upgrade request and only then starts the socket actor.
/// A refused handshake never upgrades.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    gateway: web::Data<Gateway>,
) -> Result<HttpResponse, actix_web::Error> {
    let peer_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("New WebSocket connection request from: {}", peer_addr);

    let handshake = Handshake::from_request(&req);
    let connection = gateway
        .authenticate(&handshake)
        .await
        .map_err(AppError::from)?;

    ws::start(
        WebSocketSession::new(gateway.into_inner(), connection),
        &req,
        stream,
    )
}
