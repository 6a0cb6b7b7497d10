//! Chat client error types
//!
//! Every failure in the chat subsystem resolves to one of these variants.
//! None of them is fatal to the host process.

use thiserror::Error;

/// Errors that can occur in the chat client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No session token available from the credential provider
    #[error("No session credential available")]
    NoCredential,

    /// Transport open, send or receive failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// History fetch failed (network, non-2xx, or undecodable body)
    #[error("History unavailable: {0}")]
    HistoryUnavailable(String),

    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// REST request could not be completed
    #[error("Request failed: {0}")]
    Request(String),

    /// REST endpoint answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl ChatError {
    /// Whether this error means the user has to sign in again
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::NoCredential)
            || matches!(self, ChatError::Api { status, .. } if *status == 401 || *status == 403)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
