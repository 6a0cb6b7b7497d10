//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat server endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the REST API (history and room directory)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base URL of the WebSocket endpoint
    #[serde(default = "default_ws_base")]
    pub ws_base: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "http://127.0.0.1:8000/finaldraft".to_string()
}

fn default_ws_base() -> String {
    "ws://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ws_base: default_ws_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Where the session credential comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// `PARLEY_SESSION_KEY` / `PARLEY_CSRF_TOKEN`
    #[default]
    Env,
    /// A cookie jar file exported from the browser or written by curl
    CookieFile,
}

impl std::str::FromStr for CredentialSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "env" => Ok(CredentialSource::Env),
            "cookie_file" => Ok(CredentialSource::CookieFile),
            other => Err(format!("unknown credential source: {}", other)),
        }
    }
}

/// Session credential configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub source: CredentialSource,

    pub cookie_file: Option<String>,

    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,
}

fn default_session_cookie() -> String {
    "sessionid".to_string()
}

fn default_csrf_cookie() -> String {
    "csrftoken".to_string()
}

fn default_cookie_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("parley").join("cookies.txt"))
        .unwrap_or_else(|| PathBuf::from("./cookies.txt"))
}

impl SessionConfig {
    /// Cookie file to read, falling back to the per-user data directory
    pub fn cookie_file_path(&self) -> PathBuf {
        self.cookie_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_cookie_file)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: CredentialSource::default(),
            cookie_file: None,
            session_cookie: default_session_cookie(),
            csrf_cookie: default_csrf_cookie(),
        }
    }
}

/// Live connection and history behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Page size for the history request; the server default applies when unset
    pub history_page_size: Option<u32>,
}

fn default_connect_timeout() -> u64 {
    10_000
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            history_page_size: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("parley").join("config.toml")),
            Some(PathBuf::from("/etc/parley/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(url) = std::env::var("PARLEY_API_BASE") {
            self.server.api_base = url;
        }
        if let Ok(url) = std::env::var("PARLEY_WS_BASE") {
            self.server.ws_base = url;
        }

        // Session overrides
        if let Ok(source) = std::env::var("PARLEY_SESSION_SOURCE") {
            match source.parse() {
                Ok(s) => self.session.source = s,
                Err(e) => tracing::warn!("Ignoring PARLEY_SESSION_SOURCE: {}", e),
            }
        }
        if let Ok(path) = std::env::var("PARLEY_COOKIE_FILE") {
            self.session.cookie_file = Some(path);
        }

        // Connection overrides
        if let Ok(timeout) = std::env::var("PARLEY_CONNECT_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.connection.connect_timeout_ms = t;
            }
        }
        if let Ok(size) = std::env::var("PARLEY_HISTORY_PAGE_SIZE") {
            if let Ok(s) = size.parse() {
                self.connection.history_page_size = Some(s);
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("PARLEY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PARLEY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Parley Configuration
#
# Environment variables override these settings:
# - PARLEY_API_BASE
# - PARLEY_WS_BASE
# - PARLEY_SESSION_SOURCE
# - PARLEY_COOKIE_FILE
# - PARLEY_CONNECT_TIMEOUT_MS
# - PARLEY_HISTORY_PAGE_SIZE
# - PARLEY_LOG_LEVEL
# - PARLEY_LOG_FORMAT

[server]
# REST API base (history, room directory)
api_base = "http://127.0.0.1:8000/finaldraft"

# WebSocket base; rooms live under /ws/chat/{room_id}/
ws_base = "ws://127.0.0.1:8000"

# HTTP request timeout in seconds
request_timeout_secs = 30

[session]
# Credential source: "env" (PARLEY_SESSION_KEY, PARLEY_CSRF_TOKEN)
# or "cookie_file"
source = "env"

# Cookie jar used when source = "cookie_file"
# cookie_file = "~/.local/share/parley/cookies.txt"

# Cookie names issued by the server
session_cookie = "sessionid"
csrf_cookie = "csrftoken"

[connection]
# Give up opening the WebSocket after this long (ms)
connect_timeout_ms = 10000

# Messages per history page (server default when unset)
# history_page_size = 20

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/parley/parley.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.api_base, "http://127.0.0.1:8000/finaldraft");
        assert_eq!(config.server.ws_base, "ws://127.0.0.1:8000");
        assert_eq!(config.session.source, CredentialSource::Env);
        assert_eq!(config.session.session_cookie, "sessionid");
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.connection.history_page_size, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.session.csrf_cookie, "csrftoken");
        assert_eq!(config.connection.connect_timeout_ms, 10_000);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\napi_base = \"https://chat.example.com/finaldraft\"\n\n[session]\nsource = \"cookie_file\"\ncookie_file = \"/tmp/jar.txt\"\n\n[connection]\nhistory_page_size = 50"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.api_base, "https://chat.example.com/finaldraft");
        assert_eq!(config.server.ws_base, "ws://127.0.0.1:8000");
        assert_eq!(config.session.source, CredentialSource::CookieFile);
        assert_eq!(config.session.cookie_file_path(), PathBuf::from("/tmp/jar.txt"));
        assert_eq!(config.connection.history_page_size, Some(50));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/parley.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\napi_base = ").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_credential_source_from_str() {
        assert_eq!("env".parse::<CredentialSource>(), Ok(CredentialSource::Env));
        assert_eq!(
            "cookie_file".parse::<CredentialSource>(),
            Ok(CredentialSource::CookieFile)
        );
        assert!("keychain".parse::<CredentialSource>().is_err());
    }
}
