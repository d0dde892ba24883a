use actix::prelude::*;
use actix_web_actors::ws;
use futures::stream;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::websocket::{ClientEvent, Connection, Gateway, ServerEvent};

/// Socket actor for one authenticated connection.
///
/// Inbound frames are handled one at a time: each `sendMessage` holds the
/// actor until its store call and broadcast complete, which keeps a single
/// sender's messages in arrival order.
pub struct WebSocketSession {
    gateway: Arc<Gateway>,
    connection: Connection,
    sender: mpsc::UnboundedSender<ServerEvent>,
    outbound: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    last_heartbeat: Instant,
}

impl WebSocketSession {
    pub fn new(gateway: Arc<Gateway>, connection: Connection) -> Self {
        let (sender, outbound) = mpsc::unbounded_channel();
        Self {
            gateway,
            connection,
            sender,
            outbound: Some(outbound),
            last_heartbeat: Instant::now(),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut <Self as Actor>::Context) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to parse message from {}: {}", self.connection.id(), e);
                self.send_event(ctx, &ServerEvent::Error("Invalid message format.".into()));
                return;
            }
        };

        let identity = match self.connection.identity() {
            Some(identity) if self.connection.is_authenticated() => identity.clone(),
            _ => {
                error!(
                    "Socket {} sent an event without authenticated user state.",
                    self.connection.id()
                );
                ctx.stop();
                return;
            }
        };

        match event {
            ClientEvent::SendMessage(payload) => {
                let gateway = self.gateway.clone();
                let session_id = self.connection.id();
                ctx.wait(
                    async move {
                        // failures were already reported to the sender
                        let _ = gateway.ingest(session_id, &identity, payload).await;
                    }
                    .into_actor(self),
                );
            }
        }
    }

    fn send_event(&self, ctx: &mut <Self as Actor>::Context, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(json_str) => ctx.text(json_str),
            Err(e) => error!("Failed to serialize server event: {}", e),
        }
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        let heartbeat = self.gateway.heartbeat();
        ctx.run_interval(heartbeat.interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > heartbeat.client_timeout {
                warn!("Heartbeat timeout for connection {}", act.connection.id());
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WebSocketSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(stream::unfold(outbound, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            }));
        }

        // Nothing else runs until admission resolves.
        let gateway = self.gateway.clone();
        let connection = self.connection.clone();
        let sender = self.sender.clone();
        ctx.wait(
            async move { gateway.admit(&connection, sender).await }
                .into_actor(self)
                .map(|result, act, ctx| match result {
                    Ok(()) => {
                        info!("WebSocket connection established (id: {})", act.connection.id());
                        act.start_heartbeat(ctx);
                    }
                    Err(e) => {
                        error!("Dropping socket {}: {}", act.connection.id(), e);
                        ctx.stop();
                    }
                }),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.connection.close();
        let gateway = self.gateway.clone();
        let session_id = self.connection.id();
        actix_rt::spawn(async move {
            gateway.disconnect(&session_id).await;
        });
        info!("WebSocket connection closed (id: {})", session_id);
    }
}

impl StreamHandler<ServerEvent> for WebSocketSession {
    fn handle(&mut self, event: ServerEvent, ctx: &mut Self::Context) {
        self.send_event(ctx, &event);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                warn!("Received binary message of {} bytes on {}", bin.len(), self.connection.id());
                self.send_event(ctx, &ServerEvent::Error("Binary messages are not supported.".into()));
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed by client {}: {:?}", self.connection.id(), reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message on {}: {}", self.connection.id(), e);
                ctx.stop();
            }
        }
    }
}
