//! In-process transport for tests
//!
//! Every `open` creates a [`MemoryPeer`] the test drives: it pushes inbound
//! events and inspects what the client wrote.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{CloseInfo, Connector, FrameSink, TransportEvent, TransportLink};
use crate::error::{ChatError, ChatResult};

/// Test-side handle of one opened transport
#[derive(Clone)]
pub(crate) struct MemoryPeer {
    pub url: String,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    written: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.inbound_tx.send(TransportEvent::Frame(text.into()));
    }

    pub fn push_close(&self, code: u16, reason: &str) {
        let _ = self.inbound_tx.send(TransportEvent::Closed(CloseInfo {
            code: Some(code),
            reason: reason.to_string(),
        }));
    }

    pub fn push_failure(&self, error: &str) {
        let _ = self.inbound_tx.send(TransportEvent::Failed(error.to_string()));
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

enum OpenBehaviour {
    Fail(String),
    Hang,
}

/// Connector handing out in-memory transports
#[derive(Clone, Default)]
pub(crate) struct MemoryConnector {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
    scripted: Arc<Mutex<VecDeque<OpenBehaviour>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail before the transport is established
    pub fn fail_next_open(&self, error: &str) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(OpenBehaviour::Fail(error.to_string()));
    }

    /// Make the next `open` never complete
    pub fn hang_next_open(&self) {
        self.scripted.lock().unwrap().push_back(OpenBehaviour::Hang);
    }

    /// Make every write fail from now on
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn peer(&self, index: usize) -> MemoryPeer {
        self.peers.lock().unwrap()[index].clone()
    }

    pub fn last_peer(&self) -> MemoryPeer {
        self.peers.lock().unwrap().last().cloned().expect("no transport opened")
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> ChatResult<TransportLink> {
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(OpenBehaviour::Fail(error)) => return Err(ChatError::Transport(error)),
            Some(OpenBehaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            None => {}
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.to_string(),
            inbound_tx,
            written: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.peers.lock().unwrap().push(peer.clone());

        let inbound = futures_util::stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(TransportLink {
            sink: Box::new(MemorySink {
                written: peer.written,
                closed: peer.closed,
                fail_writes: Arc::clone(&self.fail_writes),
            }),
            inbound: Box::pin(inbound),
        })
    }
}

struct MemorySink {
    written: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> ChatResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("broken pipe".to_string()));
        }
        self.written.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) -> ChatResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
