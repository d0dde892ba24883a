//! WebSocket module for the chat gateway
//!
//! Connection state, the session registry, message ingest, and the socket
//! actor that ties them to actix-web.

mod connection;
mod ingest;
mod registry;
mod server;
mod session;

pub use connection::{ClientEvent, Connection, ConnectionState, SendMessagePayload, ServerEvent};
pub use ingest::IngestHandler;
pub use registry::SessionRegistry;
pub use server::{websocket_route, Broadcaster, Gateway, Heartbeat};
pub use session::WebSocketSession;
