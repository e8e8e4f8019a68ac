//! Client configuration.
//!
//! Settings come from the environment (optionally via a `.env` file) or are
//! assembled with [`ConfigBuilder`]. The WebSocket URL is derived from the
//! REST base URL unless set explicitly.

use std::env;

use secrecy::SecretString;
use tracing::Level;

use crate::client::consts::{
    DEFAULT_API_URL, DEFAULT_CHANNEL_CAPACITY, READER_API_URL, READER_CHANNEL_CAPACITY,
    READER_SESSION_COOKIE, READER_WS_URL, SESSIONS_PATH, WS_PATH,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("URL must start with http:// or https://: {0}")]
    InvalidUrl(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    api_url: String,
    ws_url: String,
    session_cookie: Option<SecretString>,
    channel_capacity: usize,
    log_level: Level,
}

pub struct ConfigBuilder {
    config: Config,
    explicit_ws_url: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
            explicit_ws_url: false,
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.config.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_ws_url(mut self, ws_url: &str) -> Self {
        self.config.ws_url = ws_url.to_string();
        self.explicit_ws_url = true;
        self
    }

    pub fn with_session_cookie(mut self, cookie: &str) -> Self {
        self.config.session_cookie = Some(SecretString::from(cookie.to_string()));
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_log_level(mut self, level: Level) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn build(mut self) -> Result<Config, ConfigError> {
        if !self.explicit_ws_url {
            self.config.ws_url = derive_ws_url(&self.config.api_url)?;
        }
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: format!("ws://localhost:3000{}", WS_PATH),
            session_cookie: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_level: Level::INFO,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads configuration from environment variables.
    ///
    // *   `READER_API_URL`: REST base URL. Defaults to "http://localhost:3000".
    // *   `READER_WS_URL`: (Optional) WebSocket endpoint. Derived from the API URL when unset.
    // *   `READER_SESSION_COOKIE`: (Optional) Auth cookie value issued at login.
    // *   `READER_CHANNEL_CAPACITY`: (Optional) Outbound queue capacity. Defaults to 1024.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();

        if let Ok(api_url) = env::var(READER_API_URL) {
            builder = builder.with_api_url(&api_url);
        }
        if let Ok(ws_url) = env::var(READER_WS_URL) {
            builder = builder.with_ws_url(&ws_url);
        }
        if let Ok(cookie) = env::var(READER_SESSION_COOKIE) {
            builder = builder.with_session_cookie(&cookie);
        }
        if let Ok(capacity) = env::var(READER_CHANNEL_CAPACITY) {
            let parsed = capacity
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber {
                    name: READER_CHANNEL_CAPACITY,
                    value: capacity.clone(),
                })?;
            builder = builder.with_channel_capacity(parsed);
        }

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        builder.with_log_level(log_level).build()
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn sessions_url(&self) -> String {
        format!("{}{}", self.api_url, SESSIONS_PATH)
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn session_cookie(&self) -> Option<&SecretString> {
        self.session_cookie.as_ref()
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_ws_url(api_url: &str) -> Result<String, ConfigError> {
    let base = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(ConfigError::InvalidUrl(api_url.to_string()));
    };
    Ok(format!("{}{}", base.trim_end_matches('/'), WS_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_ws_url_is_derived_from_api_url() -> Result<(), ConfigError> {
        let config = Config::builder()
            .with_api_url("https://reader.example.com/")
            .build()?;
        assert_eq!(config.api_url(), "https://reader.example.com");
        assert_eq!(config.ws_url(), "wss://reader.example.com/ws");
        assert_eq!(config.sessions_url(), "https://reader.example.com/sessions");
        Ok(())
    }

    #[test]
    fn test_explicit_ws_url_wins() -> Result<(), ConfigError> {
        let config = Config::builder()
            .with_api_url("http://localhost:8080")
            .with_ws_url("ws://127.0.0.1:9000/socket")
            .build()?;
        assert_eq!(config.ws_url(), "ws://127.0.0.1:9000/socket");
        Ok(())
    }

    #[test]
    fn test_invalid_api_scheme_is_rejected() {
        let result = Config::builder().with_api_url("ftp://nope").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_defaults() {
        let config = Config::builder()
            .with_session_cookie("secret")
            .with_channel_capacity(0)
            .build()
            .unwrap();
        assert_eq!(config.ws_url(), "ws://localhost:3000/ws");
        assert_eq!(config.channel_capacity(), 1);
        assert_eq!(config.session_cookie().unwrap().expose_secret(), "secret");
        assert_eq!(config.log_level(), Level::INFO);
    }
}
