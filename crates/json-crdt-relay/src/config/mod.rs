//! Process-wide relay configuration.
//!
//! Built from defaults, environment variables or a TOML file, and installed
//! once with [`configure`] before any session starts.

use serde::{Deserialize, Serialize};
use std::env;
use std::sync::OnceLock;

use url::Url;

use crate::logging::{LogConfig, LogLevel};

mod error;

pub use error::ConfigError;

static GLOBAL: OnceLock<Config> = OnceLock::new();

/// Relay client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket URL of the relay (`ws://` or `wss://`)
    pub server_url: String,

    /// Application identity sent as `app-key`
    pub app_key: Option<String>,

    /// Host identity sent as `host`
    pub host: String,

    /// Record session metrics
    pub telemetry: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8787".to_string(),
            app_key: None,
            host: "localhost".to_string(),
            telemetry: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level: LogLevel = self
            .level
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{e}")))?;
        Ok(LogConfig::new(level)
            .with_target(self.with_target)
            .json_format(self.json_format))
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `JSON_CRDT_RELAY_<KEY>`, for example
    /// `JSON_CRDT_RELAY_SERVER_URL=wss://relay.example.com`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = var("JSON_CRDT_RELAY_SERVER_URL") {
            config.server_url = url;
        }
        if let Some(key) = var("JSON_CRDT_RELAY_APP_KEY") {
            config.app_key = (!key.is_empty()).then_some(key);
        }
        if let Some(host) = var("JSON_CRDT_RELAY_HOST") {
            config.host = host;
        }
        if let Some(telemetry) = var("JSON_CRDT_RELAY_TELEMETRY") {
            config.telemetry = telemetry
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid telemetry flag: {}", e)))?;
        }
        if let Some(level) = var("JSON_CRDT_RELAY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = var("JSON_CRDT_RELAY_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server_url()?;

        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "host must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// The relay URL, checked for a WebSocket scheme.
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid server URL: {}", e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::ValidationFailed(format!(
                "server URL must use ws or wss, got {other}"
            ))),
        }
    }
}

/// Install the process-wide configuration.
///
/// Must happen before the first session starts; a second call, or a call
/// after [`global`] already fell back to defaults, fails.
pub fn configure(config: Config) -> Result<(), ConfigError> {
    config.validate()?;
    GLOBAL
        .set(config)
        .map_err(|_| ConfigError::AlreadyConfigured)
}

/// The installed configuration, or the defaults if none was installed.
pub fn global() -> &'static Config {
    GLOBAL.get_or_init(Config::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_url().unwrap().scheme(), "ws");
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_vars(vars(&[
            ("JSON_CRDT_RELAY_SERVER_URL", "wss://relay.example.com/sync"),
            ("JSON_CRDT_RELAY_APP_KEY", "app-1"),
            ("JSON_CRDT_RELAY_TELEMETRY", "false"),
            ("JSON_CRDT_RELAY_LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.server_url, "wss://relay.example.com/sync");
        assert_eq!(config.app_key.as_deref(), Some("app-1"));
        assert!(!config.telemetry);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn test_env_rejects_bad_values() {
        assert!(matches!(
            Config::from_vars(vars(&[("JSON_CRDT_RELAY_TELEMETRY", "maybe")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            Config::from_vars(vars(&[("JSON_CRDT_RELAY_SERVER_URL", "http://x")])),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_toml() {
        let config = Config::from_toml(
            r#"
            server_url = "wss://relay.example.com"
            telemetry = false

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();
        assert!(!config.telemetry);
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.with_target);
        assert_eq!(config.host, "localhost");

        assert!(matches!(
            Config::from_toml("server_url = 5"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.logging.to_log_config().unwrap().level,
            LogLevel::Debug
        );
    }
}
