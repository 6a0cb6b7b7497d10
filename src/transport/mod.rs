//! Live Transport
//!
//! The seam between the connection manager and the wire. A [`Connector`]
//! opens a [`TransportLink`]: a sink for outbound text frames and a stream
//! of inbound events.
//!
//! - **websocket**: `tokio-tungstenite` client used in production
//! - **memory**: in-process transport for tests

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

use crate::error::ChatResult;

mod websocket;

#[cfg(test)]
pub(crate) mod memory;

pub use websocket::WebSocketConnector;

/// Close details reported by the peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

/// Something that happened on the inbound side of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame
    Frame(String),
    /// The peer closed the connection
    Closed(CloseInfo),
    /// Receiving failed; the transport is unusable
    Failed(String),
}

/// Inbound half of a transport. Ending without `Closed` counts as a close.
pub type InboundStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Outbound half of a transport
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> ChatResult<()>;

    /// Send a close frame and release the connection
    async fn close(&mut self) -> ChatResult<()>;
}

/// An open transport
pub struct TransportLink {
    pub sink: Box<dyn FrameSink>,
    pub inbound: InboundStream,
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> ChatResult<TransportLink>;
}

/// Room endpoint URL with the session key as a query parameter
pub fn room_url(ws_base: &str, room: crate::message::RoomId, session_key: &str) -> String {
    format!(
        "{}/ws/chat/{}/?session_key={}",
        ws_base.trim_end_matches('/'),
        room,
        urlencoding::encode(session_key)
    )
}

/// Room endpoint URL safe for logs
pub fn redacted_room_url(ws_base: &str, room: crate::message::RoomId) -> String {
    format!("{}/ws/chat/{}/", ws_base.trim_end_matches('/'), room)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RoomId;

    #[test]
    fn test_room_url() {
        assert_eq!(
            room_url("ws://127.0.0.1:8000/", RoomId(12), "abc"),
            "ws://127.0.0.1:8000/ws/chat/12/?session_key=abc"
        );
    }

    #[test]
    fn test_room_url_encodes_key() {
        let url = room_url("wss://chat.example.com", RoomId(1), "a b&c=d");
        assert_eq!(url, "wss://chat.example.com/ws/chat/1/?session_key=a%20b%26c%3Dd");
    }

    #[test]
    fn test_redacted_url_has_no_key() {
        let url = redacted_room_url("ws://127.0.0.1:8000", RoomId(3));
        assert_eq!(url, "ws://127.0.0.1:8000/ws/chat/3/");
    }
}
