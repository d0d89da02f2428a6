//! Engine Configuration
//!
//! Server endpoint, bearer credential, and the timing constants the sync
//! behavior is built around. Values come from the builder, a TOML file in the
//! platform config directory, or environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    server_url: String,
    token: Option<String>,
    /// Abort API requests after this long; treated as a recoverable failure
    pub request_timeout: Duration,
    /// Quiet period after the last keystroke before `typing_stop` is emitted
    pub typing_quiet_period: Duration,
    /// Defensive expiry on inbound typing flags
    pub typing_ttl: Duration,
    /// Grace period before a transport drop flips the logical connection state
    pub disconnect_grace: Duration,
    /// How recently a user must have been active to show "Recently active"
    pub recency_window: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        let server_url = std::env::var("SHELFTALK_API_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Self {
            server_url,
            token: None,
            request_timeout: Duration::from_secs(15),
            typing_quiet_period: Duration::from_secs(2),
            typing_ttl: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(5),
            recency_window: chrono::Duration::minutes(5),
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new ConfigBuilder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the platform config file when present, falling back to
    /// defaults (`$XDG_CONFIG_HOME/shelftalk/config.toml` on Linux).
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_file_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
                let file: FileConfig =
                    toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
                let mut config = Config::default();
                if let Some(url) = file.server_url {
                    config.server_url = url;
                }
                config.token = file.token;
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shelftalk").join("config.toml"))
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

/// Shape of the on-disk config file
#[derive(Debug, Deserialize)]
struct FileConfig {
    server_url: Option<String>,
    token: Option<String>,
}

/// Builder for Config
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    server_url: Option<String>,
    token: Option<String>,
    request_timeout: Option<Duration>,
    typing_quiet_period: Option<Duration>,
    typing_ttl: Option<Duration>,
    disconnect_grace: Option<Duration>,
    recency_window: Option<chrono::Duration>,
}

impl ConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the bearer token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn typing_quiet_period(mut self, period: Duration) -> Self {
        self.typing_quiet_period = Some(period);
        self
    }

    pub fn typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = Some(ttl);
        self
    }

    pub fn disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = Some(grace);
        self
    }

    pub fn recency_window(mut self, window: chrono::Duration) -> Self {
        self.recency_window = Some(window);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        if let Some(url) = self.server_url {
            if url.is_empty() {
                return Err(ConfigError::InvalidUrl(url));
            }
            config.server_url = url;
        }
        config.token = self.token;
        if let Some(v) = self.request_timeout {
            config.request_timeout = v;
        }
        if let Some(v) = self.typing_quiet_period {
            config.typing_quiet_period = v;
        }
        if let Some(v) = self.typing_ttl {
            config.typing_ttl = v;
        }
        if let Some(v) = self.disconnect_grace {
            config.disconnect_grace = v;
        }
        if let Some(v) = self.recency_window {
            config.recency_window = v;
        }
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("config file error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
}
