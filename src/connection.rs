//! Connection Manager
//!
//! Owns the single live transport of a room session.
//!
//! ## State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                     |             |
//!                     +-> Errored <-+
//! ```
//!
//! `Disconnected` and `Errored` both allow a fresh `connect`. Nothing
//! reconnects automatically.
//!
//! Every transport gets a generation number. Tasks belonging to a transport
//! check it before touching shared state, so a closed or replaced transport
//! can never deliver into the current one.

use futures_util::StreamExt;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::error::{ChatError, ChatResult};
use crate::events::{
    ConnectEvent, ConnectionEvents, DisconnectEvent, ErrorEvent, Subscription,
};
use crate::message::{decode_frame, ChatMessage, OutboundFrame, RoomId};
use crate::transport::{
    redacted_room_url, room_url, CloseInfo, Connector, FrameSink, InboundStream, TransportEvent,
    TransportLink,
};

/// Lifecycle state of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Errored => "Error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to a `send` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the transport
    Sent,
    /// Dropped: no open transport. Messages are never queued.
    NotConnected,
    /// Dropped: nothing but whitespace
    Empty,
    /// Dropped: the transport went away while sending
    Failed,
}

/// Connection manager settings
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// e.g. `ws://127.0.0.1:8000`
    pub ws_base: String,
    /// Upper bound on the transport open handshake
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let config = Config::default();
        Self::from(&config)
    }
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            ws_base: config.server.ws_base.clone(),
            connect_timeout: config.connection.connect_timeout(),
        }
    }
}

struct LinkState {
    status: ConnectionStatus,
    generation: u64,
    room: Option<RoomId>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<LinkState>,
    events: ConnectionEvents,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Peer closed the transport. Fires disconnect listeners at most once.
    fn remote_closed(&self, generation: u64, room: RoomId, info: CloseInfo) {
        {
            let mut state = self.lock();
            if state.generation != generation || state.status != ConnectionStatus::Connected {
                return;
            }
            state.status = ConnectionStatus::Disconnected;
            state.generation += 1;
            state.outbound = None;
            state.reader = None;
        }

        tracing::info!(
            room = %room,
            code = ?info.code,
            reason = %info.reason,
            "Connection closed by peer"
        );
        self.events.disconnect.emit(&DisconnectEvent {
            room,
            code: info.code,
            reason: info.reason,
            initiated_locally: false,
        });
    }

    /// Transport failed. Returns false when the transport was already stale.
    fn fail(&self, generation: u64, room: RoomId, error: ChatError) -> bool {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return false;
            }
            state.status = ConnectionStatus::Errored;
            state.generation += 1;
            state.outbound = None;
            if let Some(reader) = state.reader.take() {
                reader.abort();
            }
        }

        tracing::warn!(room = %room, error = %error, "Connection failed");
        self.events.error.emit(&ErrorEvent { room, error });
        true
    }
}

/// Owns one live transport and dispatches its events
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    settings: ConnectionSettings,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            connector,
            credentials,
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState {
                    status: ConnectionStatus::Disconnected,
                    generation: 0,
                    room: None,
                    outbound: None,
                    reader: None,
                }),
                events: ConnectionEvents::default(),
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Room of the current or most recent transport
    pub fn room(&self) -> Option<RoomId> {
        self.shared.lock().room
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Open a transport to `room`
    ///
    /// Fails with `NoCredential` before touching any state when the user is
    /// not signed in. An already active transport is closed first.
    pub async fn connect(&self, room: RoomId) -> ChatResult<()> {
        let Some(credential) = self.credentials.credential() else {
            tracing::warn!(room = %room, "Cannot connect: no session credential");
            return Err(ChatError::NoCredential);
        };

        self.disconnect();

        let generation = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.status = ConnectionStatus::Connecting;
            state.room = Some(room);
            state.generation
        };

        tracing::info!(
            room = %room,
            url = %redacted_room_url(&self.settings.ws_base, room),
            "Connecting"
        );

        let url = room_url(&self.settings.ws_base, room, &credential.session_key);
        let opened = match tokio::time::timeout(
            self.settings.connect_timeout,
            self.connector.open(&url),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChatError::Transport(format!(
                "connect timed out after {}ms",
                self.settings.connect_timeout.as_millis()
            ))),
        };

        let link = match opened {
            Ok(link) => link,
            Err(error) => {
                let error = match error {
                    ChatError::Transport(_) => error,
                    other => ChatError::Transport(other.to_string()),
                };
                self.shared.fail(generation, room, error.clone());
                return Err(error);
            }
        };

        let TransportLink { mut sink, inbound } = link;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let superseded = {
            let mut state = self.shared.lock();
            if state.generation == generation {
                state.status = ConnectionStatus::Connected;
                state.outbound = Some(outbound_tx);
                false
            } else {
                true
            }
        };

        if superseded {
            tracing::debug!(room = %room, "Connect superseded, closing fresh transport");
            let _ = sink.close().await;
            return Err(ChatError::Transport(
                "connection attempt superseded".to_string(),
            ));
        }

        tracing::info!(room = %room, "Connected");
        self.shared.events.connect.emit(&ConnectEvent { room });

        tokio::spawn(write_loop(
            Arc::clone(&self.shared),
            generation,
            room,
            sink,
            outbound_rx,
        ));
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            generation,
            room,
            inbound,
        ));

        let mut state = self.shared.lock();
        if state.generation == generation {
            state.reader = Some(reader);
        } else {
            reader.abort();
        }

        Ok(())
    }

    /// Post a message to the room
    ///
    /// Never errors and never queues: while not connected the message is
    /// dropped and `NotConnected` is returned.
    pub fn send(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Empty;
        }

        let state = self.shared.lock();
        let outbound = match (state.status, state.outbound.as_ref()) {
            (ConnectionStatus::Connected, Some(outbound)) => outbound,
            (status, _) => {
                tracing::warn!(status = %status, "Cannot send message, not connected");
                return SendOutcome::NotConnected;
            }
        };

        let payload = match OutboundFrame::new(text).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound frame");
                return SendOutcome::Failed;
            }
        };

        if outbound.send(payload).is_err() {
            return SendOutcome::Failed;
        }
        SendOutcome::Sent
    }

    /// Close the transport, if any. Safe to call any number of times.
    pub fn disconnect(&self) {
        let closed_room = {
            let mut state = self.shared.lock();
            let was_connected = state.status == ConnectionStatus::Connected;
            state.generation += 1;
            state.status = ConnectionStatus::Disconnected;
            // Dropping the sender lets the writer flush and send a close frame
            state.outbound = None;
            if let Some(reader) = state.reader.take() {
                reader.abort();
            }
            if was_connected {
                state.room
            } else {
                None
            }
        };

        if let Some(room) = closed_room {
            tracing::info!(room = %room, "Disconnected");
            self.shared.events.disconnect.emit(&DisconnectEvent {
                room,
                code: None,
                reason: "client disconnect".to_string(),
                initiated_locally: true,
            });
        }
    }

    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.shared.events.message.add(listener)
    }

    pub fn on_connect<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectEvent) + Send + Sync + 'static,
    {
        self.shared.events.connect.add(listener)
    }

    pub fn on_disconnect<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&DisconnectEvent) + Send + Sync + 'static,
    {
        self.shared.events.disconnect.add(listener)
    }

    pub fn on_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.shared.events.error.add(listener)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.generation += 1;
        state.outbound = None;
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
    }
}

/// Forward queued frames to the transport; close it once the queue is dropped
async fn write_loop(
    shared: Arc<Shared>,
    generation: u64,
    room: RoomId,
    mut sink: Box<dyn FrameSink>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = sink.send_text(text).await {
            shared.fail(generation, room, e);
            break;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(room = %room, error = %e, "Transport close failed");
    }
}

/// Decode inbound frames and dispatch them while this transport is current
async fn read_loop(shared: Arc<Shared>, generation: u64, room: RoomId, mut inbound: InboundStream) {
    while let Some(event) = inbound.next().await {
        if !shared.is_current(generation) {
            return;
        }

        match event {
            TransportEvent::Frame(text) => match decode_frame(&text) {
                Ok(message) => {
                    tracing::debug!(room = %room, message_id = message.message_id, "Message received");
                    shared.events.message.emit(&message);
                }
                Err(e) => {
                    tracing::warn!(room = %room, error = %e, "Dropping undecodable frame");
                }
            },
            TransportEvent::Closed(info) => {
                shared.remote_closed(generation, room, info);
                return;
            }
            TransportEvent::Failed(error) => {
                shared.fail(generation, room, ChatError::Transport(error));
                return;
            }
        }
    }

    shared.remote_closed(generation, room, CloseInfo::default());
}
