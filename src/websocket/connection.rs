use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Identity, StoredMessage};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessagePayload),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub text: Option<String>,
}

impl SendMessagePayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "newMessage")]
    NewMessage(StoredMessage),
    #[serde(rename = "error")]
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// One transport session. It only ever moves forward through
/// `Unauthenticated -> Authenticated -> Closed`.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    state: ConnectionState,
    identity: Option<Identity>,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Unauthenticated,
            identity: None,
        }
    }

    /// Attaches `identity`. Returns false if the connection was not awaiting authentication.
    pub fn authenticate(&mut self, identity: Identity) -> bool {
        if self.state != ConnectionState::Unauthenticated {
            return false;
        }
        self.identity = Some(identity);
        self.state = ConnectionState::Authenticated;
        true
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated && self.identity.is_some()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_lifecycle() {
        let mut connection = Connection::new();
        assert_eq!(connection.state(), ConnectionState::Unauthenticated);
        assert!(!connection.is_authenticated());
        assert!(connection.identity().is_none());

        assert!(connection.authenticate(Identity::new(7, "alice")));
        assert!(connection.is_authenticated());

        // identity is a snapshot; a second attach is refused
        assert!(!connection.authenticate(Identity::new(7, "alice-renamed")));
        assert_eq!(connection.identity().unwrap().username, "alice");

        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(!connection.is_authenticated());
        assert!(!connection.authenticate(Identity::new(8, "bob")));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(Connection::new().id(), Connection::new().id());
    }

    #[test]
    fn test_parse_send_message() {
        let event: ClientEvent =
            serde_json::from_value(json!({"type": "sendMessage", "payload": {"text": "hi"}}))
                .unwrap();
        let ClientEvent::SendMessage(payload) = event;
        assert_eq!(payload.text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_send_message_without_text_still_parses() {
        let event: ClientEvent =
            serde_json::from_value(json!({"type": "sendMessage", "payload": {}})).unwrap();
        let ClientEvent::SendMessage(payload) = event;
        assert!(payload.text.is_none());
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_value::<ClientEvent>(json!({"type": "editMessage", "payload": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_error_event_wire_shape() {
        let json = serde_json::to_value(ServerEvent::Error("Failed to send message.".into())).unwrap();
        assert_eq!(json, json!({"type": "error", "payload": "Failed to send message."}));
    }
}
