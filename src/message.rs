//! Chat Message Types
//!
//! The canonical message shape shared by history and the live feed, plus
//! the WebSocket frame formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChatError, ChatResult};

/// Server-side identifier of a message, stable across history and live delivery
pub type MessageId = u64;

/// Numeric room primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RoomId {
    fn from(id: u64) -> Self {
        RoomId(id)
    }
}

/// A single chat message
///
/// Sender identity is denormalized onto every message; the client never
/// mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// De-duplication key
    pub message_id: MessageId,
    /// Text content
    pub body: String,
    pub sender_id: u64,
    pub sender_username: String,
    pub sender_first_name: String,
    pub sender_last_name: String,
    /// Timestamp as delivered by the server (ISO 8601). Display only.
    pub sent_at: String,
}

impl ChatMessage {
    /// Parse `sent_at`, if the server sent a well-formed timestamp
    pub fn sent_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.sent_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// "First Last", or the username when both names are blank
    pub fn sender_display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.sender_first_name.trim(),
            self.sender_last_name.trim()
        );
        let full = full.trim();
        if full.is_empty() {
            self.sender_username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Frame pushed by the server for every message posted to the room
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub message_id: MessageId,
    pub message: String,
    pub username: String,
    pub user_id: u64,
    pub timestamp: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl From<InboundFrame> for ChatMessage {
    fn from(frame: InboundFrame) -> Self {
        Self {
            message_id: frame.message_id,
            body: frame.message,
            sender_id: frame.user_id,
            sender_username: frame.username,
            sender_first_name: frame.first_name.unwrap_or_default(),
            sender_last_name: frame.last_name.unwrap_or_default(),
            sent_at: frame.timestamp,
        }
    }
}

/// Frame sent by the client to post a message
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame<'a> {
    pub message: &'a str,
}

impl<'a> OutboundFrame<'a> {
    pub fn new(message: &'a str) -> Self {
        Self { message }
    }

    pub fn to_json(&self) -> ChatResult<String> {
        serde_json::to_string(self).map_err(ChatError::from)
    }
}

/// Decode a text frame into a message
pub fn decode_frame(text: &str) -> ChatResult<ChatMessage> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    Ok(frame.into())
}

#[cfg(test)]
pub(crate) fn sample_message(id: MessageId) -> ChatMessage {
    ChatMessage {
        message_id: id,
        body: format!("message {}", id),
        sender_id: 5,
        sender_username: "ada".to_string(),
        sender_first_name: "Ada".to_string(),
        sender_last_name: "Lovelace".to_string(),
        sent_at: format!("2024-05-01T12:00:{:02}+00:00", id % 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_inbound_frame() {
        let json = r#"{
            "message": "hello",
            "username": "ada",
            "user_id": 5,
            "message_id": 42,
            "timestamp": "2024-05-01T12:34:56.789000+00:00",
            "first_name": "Ada",
            "last_name": "Lovelace"
        }"#;

        let msg = decode_frame(json).unwrap();
        assert_eq!(msg.message_id, 42);
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.sender_id, 5);
        assert_eq!(msg.sender_username, "ada");
        assert_eq!(msg.sender_display_name(), "Ada Lovelace");
        assert!(msg.sent_at_utc().is_some());
    }

    #[test]
    fn test_decode_frame_without_names() {
        let json = r#"{"message":"hi","username":"bob","user_id":7,"message_id":1,"timestamp":"2024-05-01T12:00:00Z"}"#;
        let msg = decode_frame(json).unwrap();
        assert_eq!(msg.sender_first_name, "");
        assert_eq!(msg.sender_display_name(), "bob");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_frame("not json"), Err(ChatError::Decode(_))));
        assert!(matches!(
            decode_frame(r#"{"message":"missing id"}"#),
            Err(ChatError::Decode(_))
        ));
    }

    #[test]
    fn test_outbound_frame_shape() {
        let json = OutboundFrame::new("hello \"world\"").to_json().unwrap();
        assert_eq!(json, r#"{"message":"hello \"world\""}"#);
    }

    #[test]
    fn test_unparseable_timestamp() {
        let mut msg = sample_message(1);
        msg.sent_at = "yesterday".to_string();
        assert!(msg.sent_at_utc().is_none());
    }
}
