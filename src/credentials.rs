//! Session Credentials
//!
//! The single source of truth for the session token. Both the WebSocket
//! connection and the REST client read through the same provider, so they
//! can never disagree about who the user is.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::{CredentialSource, SessionConfig};

/// Environment variable holding the session key for the `env` source
pub const SESSION_KEY_VAR: &str = "PARLEY_SESSION_KEY";
/// Environment variable holding the CSRF token for the `env` source
pub const CSRF_TOKEN_VAR: &str = "PARLEY_CSRF_TOKEN";

/// An authenticated session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub session_key: String,
    pub csrf_token: Option<String>,
}

impl SessionCredential {
    /// Build a credential, rejecting an empty session key
    pub fn new(session_key: impl Into<String>, csrf_token: Option<String>) -> Option<Self> {
        let session_key = session_key.into();
        if session_key.trim().is_empty() {
            return None;
        }
        Some(Self {
            session_key,
            csrf_token: csrf_token.filter(|t| !t.trim().is_empty()),
        })
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("session_key", &"<redacted>")
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Something that can hand out the current session credential
pub trait CredentialProvider: Send + Sync {
    /// The current credential, or `None` if the user is not signed in
    fn credential(&self) -> Option<SessionCredential>;
}

/// In-memory credential store
///
/// A sign-in flow writes to it; the chat components read from it.
#[derive(Default)]
pub struct MemoryCredentials {
    current: RwLock<Option<SessionCredential>>,
}

impl MemoryCredentials {
    pub fn new(credential: Option<SessionCredential>) -> Self {
        Self {
            current: RwLock::new(credential),
        }
    }

    pub fn set(&self, credential: SessionCredential) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(credential);
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl CredentialProvider for MemoryCredentials {
    fn credential(&self) -> Option<SessionCredential> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Reads the credential from environment variables on every call
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    session_var: String,
    csrf_var: String,
}

impl EnvCredentials {
    pub fn new(session_var: impl Into<String>, csrf_var: impl Into<String>) -> Self {
        Self {
            session_var: session_var.into(),
            csrf_var: csrf_var.into(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(SESSION_KEY_VAR, CSRF_TOKEN_VAR)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credential(&self) -> Option<SessionCredential> {
        let session_key = std::env::var(&self.session_var).ok()?;
        SessionCredential::new(session_key, std::env::var(&self.csrf_var).ok())
    }
}

/// Reads the credential from a cookie file on every call
///
/// Accepts a Netscape cookie jar (as written by curl and browsers' export
/// tools) or plain `name=value` lines.
#[derive(Debug, Clone)]
pub struct CookieFileCredentials {
    path: PathBuf,
    session_cookie: String,
    csrf_cookie: String,
}

impl CookieFileCredentials {
    pub fn new(
        path: impl Into<PathBuf>,
        session_cookie: impl Into<String>,
        csrf_cookie: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            session_cookie: session_cookie.into(),
            csrf_cookie: csrf_cookie.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for CookieFileCredentials {
    fn credential(&self) -> Option<SessionCredential> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = ?self.path, error = %e, "Cookie file unreadable");
                return None;
            }
        };

        let session_key = find_cookie(&content, &self.session_cookie)?;
        SessionCredential::new(session_key, find_cookie(&content, &self.csrf_cookie))
    }
}

/// Find a cookie value by name in a cookie jar or `name=value` listing.
/// Later entries win, matching how a browser overwrites cookies.
fn find_cookie(content: &str, name: &str) -> Option<String> {
    let mut found = None;

    for line in content.lines() {
        // curl marks HttpOnly cookies with this prefix instead of a comment
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line).trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() >= 7 {
            if fields[5] == name {
                found = Some(fields[6].to_string());
            }
            continue;
        }

        for pair in line.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key.trim() == name {
                    found = Some(value.trim().to_string());
                }
            }
        }
    }

    found
}

/// Build the provider selected by configuration
pub fn provider_from_config(config: &SessionConfig) -> Arc<dyn CredentialProvider> {
    match config.source {
        CredentialSource::Env => Arc::new(EnvCredentials::default()),
        CredentialSource::CookieFile => Arc::new(CookieFileCredentials::new(
            config.cookie_file_path(),
            config.session_cookie.clone(),
            config.csrf_cookie.clone(),
        )),
    }
}
