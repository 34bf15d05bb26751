//! Logging setup and relay console forwarding.
//!
//! Everything in this crate logs through `tracing`. Installing a subscriber
//! is left to the application; [`init_logging`] is a ready-made one.

use std::str::FromStr;

use serde_json::Value;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::protocol::ConsoleLevel;

mod error;

pub use error::LoggingError;

/// Target under which relay `console` messages are logged.
pub const CONSOLE_TARGET: &str = "relay_console";

/// Minimum level for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Include the event target (module path or `relay_console`)
    pub with_target: bool,
    /// Emit one JSON object per line
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    // Logs go to stderr so stdout stays free for program output.
    let fmt_layer = fmt::layer()
        .with_target(config.with_target)
        .with_writer(std::io::stderr);

    if config.json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
    }
}

/// Log the payload of a relay `console` message at its own level.
pub fn forward_console(level: ConsoleLevel, logs: &[Value]) {
    let line = render_console(logs);
    match level {
        ConsoleLevel::Debug => tracing::debug!(target: CONSOLE_TARGET, "{line}"),
        ConsoleLevel::Info => tracing::info!(target: CONSOLE_TARGET, "{line}"),
        ConsoleLevel::Warn => tracing::warn!(target: CONSOLE_TARGET, "{line}"),
        ConsoleLevel::Error => tracing::error!(target: CONSOLE_TARGET, "{line}"),
    }
}

/// Strings are printed bare, everything else as compact JSON.
fn render_console(logs: &[Value]) -> String {
    logs.iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
