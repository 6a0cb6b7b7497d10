//! Connection Events
//!
//! Typed publish/subscribe for connection lifecycle and inbound messages.
//! Listeners run in registration order. Registration hands back a
//! [`Subscription`]; dropping it leaves the listener registered, calling
//! [`Subscription::dispose`] removes it.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ChatError;
use crate::message::{ChatMessage, RoomId};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// An ordered set of listeners for one event type
pub struct ListenerSet<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener
    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::new(listener)));
            id
        };

        let registry = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    lock(&registry).entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Invoke every listener with `value`
    ///
    /// The registry lock is released before listeners run, so a listener
    /// may register or dispose listeners without deadlocking.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = lock(&self.registry)
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle returned by listener registration
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unregister the listener
    pub fn dispose(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// The transport opened successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectEvent {
    pub room: RoomId,
}

/// The transport closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub room: RoomId,
    /// WebSocket close code, when the peer sent one
    pub code: Option<u16>,
    pub reason: String,
    /// True when the close came from `disconnect()` rather than the peer
    pub initiated_locally: bool,
}

/// A transport-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub room: RoomId,
    pub error: ChatError,
}

/// All listener sets owned by one connection manager
#[derive(Default)]
pub struct ConnectionEvents {
    pub message: ListenerSet<ChatMessage>,
    pub connect: ListenerSet<ConnectEvent>,
    pub disconnect: ListenerSet<DisconnectEvent>,
    pub error: ListenerSet<ErrorEvent>,
}
