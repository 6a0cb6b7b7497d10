//! Chat REST API Client
//!
//! HTTP client for the chat server's REST endpoints:
//!
//! - **history**: paged message history of a room
//! - **rooms**: room directory (list rooms, open a direct room)
//!
//! Every request authenticates with the same credential provider the live
//! connection uses: the session cookie plus the CSRF header.

use reqwest::header::{HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::error::{ChatError, ChatResult};

pub mod dto;
mod history;
mod rooms;

pub use dto::{HistoryRecord, LastMessage, RoomMember, RoomSummary, SenderRecord};
pub use history::{HistoryPage, HistorySource};

/// CSRF header expected by the server
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// REST client bound to one server and one credential provider
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    session_cookie: String,
    csrf_cookie: String,
    history_page_size: Option<u32>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        request_timeout: Duration,
    ) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChatError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            session_cookie: "sessionid".to_string(),
            csrf_cookie: "csrftoken".to_string(),
            history_page_size: None,
        })
    }

    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ChatResult<Self> {
        let mut client = Self::new(
            config.server.api_base.clone(),
            credentials,
            config.server.request_timeout(),
        )?;
        client.session_cookie = config.session.session_cookie.clone();
        client.csrf_cookie = config.session.csrf_cookie.clone();
        client.history_page_size = config.connection.history_page_size;
        Ok(client)
    }

    /// Request this many messages per history page
    pub fn with_history_page_size(mut self, page_size: Option<u32>) -> Self {
        self.history_page_size = page_size;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the session cookie and CSRF header
    fn authorized(&self, request: RequestBuilder) -> ChatResult<RequestBuilder> {
        let credential = self.credentials.credential().ok_or(ChatError::NoCredential)?;

        let mut cookie = format!("{}={}", self.session_cookie, credential.session_key);
        let mut request = request.header(CONTENT_TYPE, "application/json");

        if let Some(csrf) = &credential.csrf_token {
            cookie.push_str(&format!("; {}={}", self.csrf_cookie, csrf));
            request = request.header(CSRF_HEADER, csrf.as_str());
        }

        let cookie = HeaderValue::from_str(&cookie)
            .map_err(|_| ChatError::Request("session credential is not a valid cookie".to_string()))?;
        Ok(request.header(COOKIE, cookie))
    }
}

/// Describe a reqwest failure without leaking request details
fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "server unreachable".to_string()
    } else if err.is_decode() {
        format!("undecodable response: {}", err)
    } else {
        err.to_string()
    }
}

/// Turn a non-success response into `ChatError::Api`
async fn api_error(response: Response) -> ChatError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<dto::ApiErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    ChatError::Api { status, message }
}
