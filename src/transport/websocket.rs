//! WebSocket Transport
//!
//! `tokio-tungstenite` client. Ping/pong frames are handled by the protocol
//! layer and never surface as events.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{CloseInfo, Connector, FrameSink, TransportEvent, TransportLink};
use crate::error::{ChatError, ChatResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> ChatResult<TransportLink> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = stream.split();
        let inbound = stream.filter_map(|item| futures_util::future::ready(map_inbound(item)));

        Ok(TransportLink {
            sink: Box::new(WsSink { inner: sink }),
            inbound: Box::pin(inbound),
        })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> ChatResult<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(ChatError::from)
    }

    async fn close(&mut self) -> ChatResult<()> {
        self.inner.close().await.map_err(ChatError::from)
    }
}

fn map_inbound(item: Result<Message, tungstenite::Error>) -> Option<TransportEvent> {
    match item {
        Ok(Message::Text(text)) => Some(TransportEvent::Frame(text.to_string())),
        Ok(Message::Binary(data)) => Some(TransportEvent::Frame(
            String::from_utf8_lossy(&data).into_owned(),
        )),
        Ok(Message::Close(frame)) => Some(TransportEvent::Closed(
            frame
                .map(|f| CloseInfo {
                    code: Some(u16::from(f.code)),
                    reason: f.reason.to_string(),
                })
                .unwrap_or_default(),
        )),
        Ok(_) => None,
        Err(e) => Some(TransportEvent::Failed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{decode_frame, OutboundFrame, RoomId};
    use crate::transport::room_url;
    use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    async fn chat_endpoint(
        ws: WebSocketUpgrade,
        Path(room_id): Path<u64>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        if params.get("session_key").map(String::as_str) != Some("good-key") {
            return StatusCode::FORBIDDEN.into_response();
        }
        ws.on_upgrade(move |socket| relay(socket, room_id))
    }

    /// Echo each posted message back as a room broadcast; "bye" closes the room
    async fn relay(mut socket: WebSocket, room_id: u64) {
        let mut next_id = room_id * 100;

        while let Some(Ok(msg)) = socket.recv().await {
            let ws::Message::Text(text) = msg else {
                continue;
            };
            let posted: serde_json::Value = serde_json::from_str(&text).unwrap();
            let body = posted["message"].as_str().unwrap_or_default().to_string();

            if body == "bye" {
                let _ = socket
                    .send(ws::Message::Close(Some(ws::CloseFrame {
                        code: 4000,
                        reason: "room closed".into(),
                    })))
                    .await;
                return;
            }

            next_id += 1;
            let frame = serde_json::json!({
                "message": body,
                "username": "ada",
                "user_id": 5,
                "message_id": next_id,
                "timestamp": "2024-05-01T12:00:00+00:00",
                "first_name": "Ada",
                "last_name": "Lovelace",
            });
            if socket.send(ws::Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
    }

    async fn spawn_server() -> String {
        let app = Router::new().route("/ws/chat/:room_id/", get(chat_endpoint));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let base = spawn_server().await;
        let mut link = WebSocketConnector
            .open(&room_url(&base, RoomId(3), "good-key"))
            .await
            .unwrap();

        let json = OutboundFrame::new("hello").to_json().unwrap();
        link.sink.send_text(json).await.unwrap();

        match link.inbound.next().await {
            Some(TransportEvent::Frame(text)) => {
                let msg = decode_frame(&text).unwrap();
                assert_eq!(msg.message_id, 301);
                assert_eq!(msg.body, "hello");
            }
            other => panic!("Expected frame, got {:?}", other),
        }

        link.sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_handshake() {
        let base = spawn_server().await;
        let result = WebSocketConnector
            .open(&room_url(&base, RoomId(3), "wrong-key"))
            .await;

        assert!(matches!(result, Err(ChatError::Transport(_))));
    }

    #[tokio::test]
    async fn test_remote_close() {
        let base = spawn_server().await;
        let mut link = WebSocketConnector
            .open(&room_url(&base, RoomId(1), "good-key"))
            .await
            .unwrap();

        let json = OutboundFrame::new("bye").to_json().unwrap();
        link.sink.send_text(json).await.unwrap();

        match link.inbound.next().await {
            Some(TransportEvent::Closed(info)) => {
                assert_eq!(info.code, Some(4000));
                assert_eq!(info.reason, "room closed");
            }
            other => panic!("Expected close, got {:?}", other),
        }
    }

    #[test]
    fn test_map_inbound_skips_control_frames() {
        assert_eq!(map_inbound(Ok(Message::Ping(Vec::new().into()))), None);
        assert_eq!(
            map_inbound(Ok(Message::Close(None))),
            Some(TransportEvent::Closed(CloseInfo::default()))
        );
    }
}
