//! REST wire types
//!
//! Shapes returned by the chat server's REST endpoints. Unknown fields are
//! ignored and optional ones default, so older and newer servers both parse.

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageId, RoomId};

/// Sender block embedded in each history record
#[derive(Debug, Clone, Deserialize)]
pub struct SenderRecord {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// One record of `GET /chat/rooms/{id}/messages/`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    pub id: MessageId,
    pub content: String,
    pub timestamp: String,
    pub sender: SenderRecord,
}

impl From<HistoryRecord> for ChatMessage {
    fn from(record: HistoryRecord) -> Self {
        Self {
            message_id: record.id,
            body: record.content,
            sender_id: record.sender.id,
            sender_username: record.sender.username,
            sender_first_name: record.sender.first_name.unwrap_or_default(),
            sender_last_name: record.sender.last_name.unwrap_or_default(),
            sent_at: record.timestamp,
        }
    }
}

/// A member listed on a room
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomMember {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Preview of the newest message in a room
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LastMessage {
    pub id: MessageId,
    pub content: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A room the current user belongs to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub room_identifier: String,
    #[serde(default)]
    pub is_direct_message: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub members: Vec<RoomMember>,
    /// Assignment the room belongs to, for group rooms
    #[serde(default)]
    pub assignment: Option<u64>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
}

impl RoomSummary {
    /// Human-readable room name
    pub fn title(&self) -> String {
        if let Some(assignment) = self.assignment {
            return format!("Assignment chat #{}", assignment);
        }
        if self.is_direct_message {
            if let [a, b] = self.members.as_slice() {
                return format!("Direct chat: {} & {}", a.username, b.username);
            }
            return format!("Direct chat {}", self.id);
        }
        format!("Chat room {}", self.id)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DirectRoomRequest {
    pub recipient_id: u64,
}

/// Error body returned by the REST endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: String,
}
