//! Chat Client
//!
//! Holds the collaborators every room session shares and hands out
//! [`RoomSession`]s.

use std::sync::Arc;

use crate::api::{ApiClient, HistorySource};
use crate::config::Config;
use crate::connection::ConnectionSettings;
use crate::credentials::{provider_from_config, CredentialProvider};
use crate::error::ChatResult;
use crate::message::RoomId;
use crate::session::RoomSession;
use crate::transport::{Connector, WebSocketConnector};

pub struct ChatClient {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    history: Arc<dyn HistorySource>,
    settings: ConnectionSettings,
}

impl ChatClient {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        history: Arc<dyn HistorySource>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            connector,
            credentials,
            history,
            settings,
        }
    }

    /// Build the production stack: WebSocket transport and REST history,
    /// sharing one credential provider
    pub fn from_config(config: &Config) -> ChatResult<Self> {
        let credentials = provider_from_config(&config.session);
        let api = ApiClient::from_config(config, Arc::clone(&credentials))?;
        Ok(Self::new(
            Arc::new(WebSocketConnector),
            credentials,
            Arc::new(api),
            ConnectionSettings::from(config),
        ))
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Enter a room with a fresh session
    pub async fn enter_room(&self, room: RoomId) -> RoomSession {
        RoomSession::enter(
            room,
            Arc::clone(&self.connector),
            Arc::clone(&self.credentials),
            Arc::clone(&self.history),
            self.settings.clone(),
        )
        .await
    }
}
