//! Room Session
//!
//! One session per entered room. It owns a fresh [`ConnectionManager`],
//! a [`MessageReconciler`] and the history load, and wires them together:
//!
//! - history is fetched concurrently with the connect
//! - live messages go through the reconciler, so history-then-live order
//!   holds regardless of which finishes first
//! - every state change bumps a watch channel the front end can await
//!
//! [`RoomSession::leave`] tears everything down. Listener callbacks check
//! the session's `active` flag, so nothing arriving after leave is applied.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::HistorySource;
use crate::connection::{ConnectionManager, ConnectionSettings, ConnectionStatus, SendOutcome};
use crate::credentials::CredentialProvider;
use crate::error::{ChatError, ChatResult};
use crate::events::Subscription;
use crate::message::{ChatMessage, RoomId};
use crate::reconciler::MessageReconciler;
use crate::transport::Connector;
use crate::view::{self, ChatView};

/// Progress of the room's history load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    Loading,
    Loaded,
    /// The load failed; the session continues with live messages only
    Unavailable(ChatError),
}

struct SessionState {
    active: bool,
    reconciler: MessageReconciler,
    history: HistoryState,
    last_error: Option<ChatError>,
}

struct SessionShared {
    state: Mutex<SessionState>,
    changes: watch::Sender<u64>,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Apply `f` while the session is active, then notify watchers
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let result = {
            let mut state = self.lock();
            if !state.active {
                return None;
            }
            f(&mut state)
        };
        self.notify();
        Some(result)
    }
}

/// A live view of one room: history plus the real-time feed
pub struct RoomSession {
    id: Uuid,
    room: RoomId,
    connection: ConnectionManager,
    shared: Arc<SessionShared>,
    subscriptions: Mutex<Vec<Subscription>>,
    history_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomSession {
    /// Enter `room`: start the history load and connect
    ///
    /// A failed connect does not fail entry. The error is recorded and
    /// surfaces through [`RoomSession::view`]; [`RoomSession::reconnect`]
    /// retries.
    pub async fn enter(
        room: RoomId,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        history: Arc<dyn HistorySource>,
        settings: ConnectionSettings,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        let session = Self {
            id: Uuid::new_v4(),
            room,
            connection: ConnectionManager::new(connector, credentials, settings),
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState {
                    active: true,
                    reconciler: MessageReconciler::new(),
                    history: HistoryState::Loading,
                    last_error: None,
                }),
                changes,
            }),
            subscriptions: Mutex::new(Vec::new()),
            history_task: Mutex::new(None),
        };

        tracing::info!(session = %session.id, room = %room, "Entering room");

        session.register_listeners();
        session.start_history(history);

        if let Err(error) = session.connection.connect(room).await {
            session.record_error(error);
        }
        session.shared.notify();

        session
    }

    fn register_listeners(&self) {
        let mut subscriptions = lock(&self.subscriptions);

        let shared = Arc::clone(&self.shared);
        subscriptions.push(self.connection.on_message(move |message| {
            shared.update(|state| state.reconciler.append(message.clone()));
        }));

        let shared = Arc::clone(&self.shared);
        subscriptions.push(self.connection.on_connect(move |_| {
            shared.update(|state| state.last_error = None);
        }));

        let shared = Arc::clone(&self.shared);
        subscriptions.push(self.connection.on_disconnect(move |_| {
            shared.update(|_| ());
        }));

        let shared = Arc::clone(&self.shared);
        subscriptions.push(self.connection.on_error(move |event| {
            shared.update(|state| state.last_error = Some(event.error.clone()));
        }));
    }

    fn start_history(&self, source: Arc<dyn HistorySource>) {
        let shared = Arc::clone(&self.shared);
        let room = self.room;
        let session = self.id;

        let task = tokio::spawn(async move {
            let result = source.load_history(room).await;
            shared.update(|state| match result {
                Ok(messages) => {
                    state.reconciler.seed(messages);
                    state.history = HistoryState::Loaded;
                }
                Err(error) => {
                    tracing::warn!(session = %session, room = %room, error = %error, "History unavailable");
                    state.reconciler.seed(Vec::new());
                    state.history = HistoryState::Unavailable(error);
                }
            });
        });

        *lock(&self.history_task) = Some(task);
    }

    fn record_error(&self, error: ChatError) {
        self.shared.update(|state| state.last_error = Some(error));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    /// Post a message. The list only changes when the server echoes it back.
    pub fn send(&self, text: &str) -> SendOutcome {
        self.connection.send(text)
    }

    /// Retry the connection after a failure or remote close
    pub async fn reconnect(&self) -> ChatResult<()> {
        if !self.is_active() {
            return Err(ChatError::Transport("session has been left".to_string()));
        }

        tracing::info!(session = %self.id, room = %self.room, "Reconnecting");
        let result = self.connection.connect(self.room).await;
        if let Err(error) = &result {
            self.record_error(error.clone());
        }
        self.shared.notify();
        result
    }

    /// The reconciled message list, oldest first
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.lock().reconciler.messages().to_vec()
    }

    pub fn history_state(&self) -> HistoryState {
        self.shared.lock().history.clone()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        self.shared.lock().last_error.clone()
    }

    /// Wait until the history load has finished, or the session was left
    pub async fn wait_for_history(&self) -> HistoryState {
        let mut changes = self.changes();
        loop {
            {
                let state = self.shared.lock();
                if state.history != HistoryState::Loading || !state.active {
                    return state.history.clone();
                }
            }
            if changes.changed().await.is_err() {
                return self.history_state();
            }
        }
    }

    /// Receiver bumped on every change to messages, status or errors
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// Render the current state
    pub fn view(&self) -> ChatView {
        let status = self.connection.status();
        let state = self.shared.lock();
        view::project(
            self.room,
            state.reconciler.messages(),
            status,
            &state.history,
            state.last_error.as_ref(),
        )
    }

    /// Leave the room. Safe to call more than once.
    pub fn leave(&self) {
        {
            let mut state = self.shared.lock();
            if !state.active {
                return;
            }
            state.active = false;
        }

        for subscription in lock(&self.subscriptions).drain(..) {
            subscription.dispose();
        }
        if let Some(task) = lock(&self.history_task).take() {
            task.abort();
        }
        self.connection.disconnect();
        self.shared.notify();

        tracing::info!(session = %self.id, room = %self.room, "Left room");
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.leave();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
