use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreChange;

/// Frames exchanged on the live admin socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WebSocketMessage {
    Connected { connection_id: Uuid, username: String },
    StoreChanged(StoreChange),
    Ping,
    Pong,
    Error { message: String },
}

impl From<StoreChange> for WebSocketMessage {
    fn from(change: StoreChange) -> Self {
        WebSocketMessage::StoreChanged(change)
    }
}

impl WebSocketMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The frame to send back for a text frame from the client, if any.
    pub fn reply_to(text: &str) -> Option<WebSocketMessage> {
        match Self::from_json(text) {
            Ok(WebSocketMessage::Ping) => Some(WebSocketMessage::Pong),
            Ok(_) => None,
            Err(e) => Some(WebSocketMessage::Error {
                message: format!("Unrecognized frame: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;

    #[test]
    fn test_store_change_frame_shape() {
        let change = StoreChange::new("portfolio_messages", 3, ChangeKind::Submitted);
        let json: serde_json::Value =
            serde_json::from_str(&WebSocketMessage::from(change).to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "StoreChanged");
        assert_eq!(json["data"]["slot"], "portfolio_messages");
        assert_eq!(json["data"]["version"], 3);
        assert_eq!(json["data"]["kind"], "submitted");
    }

    #[test]
    fn test_ping_parses() {
        assert!(matches!(
            WebSocketMessage::from_json(r#"{"type":"Ping"}"#).unwrap(),
            WebSocketMessage::Ping
        ));
    }

    #[test]
    fn test_replies_to_client_frames() {
        assert!(matches!(
            WebSocketMessage::reply_to(r#"{"type":"Ping"}"#),
            Some(WebSocketMessage::Pong)
        ));
        assert!(WebSocketMessage::reply_to(r#"{"type":"Pong"}"#).is_none());

        let reply = WebSocketMessage::reply_to("hello").unwrap();
        let json: serde_json::Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "Error");
        assert!(json["data"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Unrecognized frame"));
    }
}
