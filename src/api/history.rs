//! Message history
//!
//! The server returns history newest first; everything downstream works
//! oldest first, so pages are reversed before they leave this module.

use async_trait::async_trait;

use super::dto::HistoryRecord;
use super::{describe, ApiClient};
use crate::error::{ChatError, ChatResult};
use crate::message::{ChatMessage, RoomId};

/// Anything that can produce a room's prior messages, oldest first
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn load_history(&self, room: RoomId) -> ChatResult<Vec<ChatMessage>>;
}

/// One page of history. Page 1 holds the newest messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    pub page: u32,
    pub page_size: u32,
}

impl HistoryPage {
    pub fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }
}

impl ApiClient {
    /// Fetch one page of a room's history, oldest first
    ///
    /// With `page = None` the server's default paging applies.
    pub async fn load_page(
        &self,
        room: RoomId,
        page: Option<HistoryPage>,
    ) -> ChatResult<Vec<ChatMessage>> {
        let mut request = self.client.get(self.url(&format!("/chat/rooms/{}/messages/", room)));
        if let Some(page) = page {
            request = request.query(&[("page", page.page), ("page_size", page.page_size)]);
        }
        let request = self.authorized(request)?;

        let response = request
            .send()
            .await
            .map_err(|e| ChatError::HistoryUnavailable(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(room = %room, status = status.as_u16(), "History request rejected");
            return Err(ChatError::HistoryUnavailable(format!(
                "server returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let records: Vec<HistoryRecord> = response
            .json()
            .await
            .map_err(|e| ChatError::HistoryUnavailable(describe(&e)))?;

        let mut messages: Vec<ChatMessage> = records.into_iter().map(ChatMessage::from).collect();
        messages.reverse();

        tracing::debug!(room = %room, count = messages.len(), "Loaded history");
        Ok(messages)
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn load_history(&self, room: RoomId) -> ChatResult<Vec<ChatMessage>> {
        self.load_page(room, self.history_page_size.map(HistoryPage::first))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::client_for;
    use crate::credentials::MemoryCredentials;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: u64, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "content": content,
            "timestamp": format!("2024-05-01T12:00:{:02}Z", id),
            "sender": {"id": 3, "username": "grace", "first_name": "Grace", "last_name": "Hopper"},
            "room": 4
        })
    }

    #[tokio::test]
    async fn test_history_reversed_to_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/rooms/4/messages/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                record(3, "third"),
                record(2, "second"),
                record(1, "first"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let messages = client_for(&server.uri()).load_history(RoomId(4)).await.unwrap();

        let ids: Vec<u64> = messages.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(messages[0].body, "first");
        assert_eq!(messages[0].sender_display_name(), "Grace Hopper");
    }

    #[tokio::test]
    async fn test_history_sends_session_and_csrf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/rooms/4/messages/"))
            .and(header("X-CSRFToken", "csrf"))
            .and(header("Cookie", "sessionid=sess-key; csrftoken=csrf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let messages = client_for(&server.uri()).load_history(RoomId(4)).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_history_page_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/rooms/4/messages/"))
            .and(query_param("page", "1"))
            .and(query_param("page_size", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([record(9, "x")])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri()).with_history_page_size(Some(50));
        let messages = client.load_history(RoomId(4)).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_history_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = client_for(&server.uri()).load_history(RoomId(4)).await;
        match result {
            Err(ChatError::HistoryUnavailable(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected HistoryUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server.uri()).load_history(RoomId(4)).await;
        assert!(matches!(result, Err(ChatError::HistoryUnavailable(_))));
    }

    #[tokio::test]
    async fn test_history_unreachable_server() {
        let result = client_for("http://127.0.0.1:1").load_history(RoomId(4)).await;
        assert!(matches!(result, Err(ChatError::HistoryUnavailable(_))));
    }

    #[tokio::test]
    async fn test_history_without_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let client = ApiClient::new(
            server.uri(),
            Arc::new(MemoryCredentials::default()),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client.load_history(RoomId(4)).await;
        assert_eq!(result, Err(ChatError::NoCredential));
    }
}
