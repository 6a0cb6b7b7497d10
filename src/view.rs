//! Presentation Adapter
//!
//! Pure projection of session state to a renderable view model. Holds no
//! state of its own.

use chrono::{DateTime, Local, TimeZone};

use crate::connection::ConnectionStatus;
use crate::error::ChatError;
use crate::message::{ChatMessage, MessageId, RoomId};
use crate::session::HistoryState;

pub const HISTORY_FAILED: &str = "Failed to load messages. Please try again later.";
pub const CONNECT_FAILED: &str =
    "Failed to connect to chat. Please refresh the page or try again later.";
pub const NOT_SIGNED_IN: &str = "Not signed in: no session credential available.";

/// One rendered message row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    /// Stable row key
    pub key: MessageId,
    pub sender_name: String,
    /// Local time of day, or the raw timestamp when it does not parse
    pub time_label: String,
    pub body: String,
}

/// Everything a front end needs to draw a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    pub room: RoomId,
    pub status: ConnectionStatus,
    pub status_label: &'static str,
    pub can_send: bool,
    pub banner: Option<String>,
    pub messages: Vec<MessageView>,
}

/// Project state to a view, rendering times in the local timezone
pub fn project(
    room: RoomId,
    messages: &[ChatMessage],
    status: ConnectionStatus,
    history: &HistoryState,
    last_error: Option<&ChatError>,
) -> ChatView {
    project_in(room, messages, status, history, last_error, &Local)
}

/// Project state to a view, rendering times in `tz`
pub fn project_in<Tz>(
    room: RoomId,
    messages: &[ChatMessage],
    status: ConnectionStatus,
    history: &HistoryState,
    last_error: Option<&ChatError>,
    tz: &Tz,
) -> ChatView
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    ChatView {
        room,
        status,
        status_label: status.label(),
        can_send: status.is_connected(),
        banner: banner(status, history, last_error).map(str::to_string),
        messages: messages
            .iter()
            .map(|m| MessageView {
                key: m.message_id,
                sender_name: m.sender_display_name(),
                time_label: time_label(&m.sent_at, tz),
                body: m.body.clone(),
            })
            .collect(),
    }
}

/// Error banner to show, most severe first
fn banner(
    status: ConnectionStatus,
    history: &HistoryState,
    last_error: Option<&ChatError>,
) -> Option<&'static str> {
    let history_error = match history {
        HistoryState::Unavailable(e) => Some(e),
        _ => None,
    };

    if last_error == Some(&ChatError::NoCredential) || history_error == Some(&ChatError::NoCredential)
    {
        return Some(NOT_SIGNED_IN);
    }
    if status == ConnectionStatus::Errored || last_error.is_some() {
        return Some(CONNECT_FAILED);
    }
    history_error.map(|_| HISTORY_FAILED)
}

/// `HH:MM` in `tz`, falling back to the raw string
pub fn time_label<Tz>(raw: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(tz).format("%H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}
