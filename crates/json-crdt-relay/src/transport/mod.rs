//! Bidirectional text channel to the relay.
//!
//! Sessions only ever see the [`Transport`] trait, so the protocol runs the
//! same over a WebSocket or an in-memory pair.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

mod memory;
mod websocket;

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// Default channel key when the caller supplies none.
pub const DEFAULT_CHANNEL_KEY: &str = "default";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// An ordered, reliable channel of text frames.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> TransportResult<()>;

    /// Next inbound frame; `None` once the channel is closed.
    async fn recv(&mut self) -> Option<TransportResult<String>>;

    async fn close(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

/// Relay address for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    pub server_url: Url,
    pub host: String,
    pub key: String,
    pub app_key: Option<String>,
}

impl ChannelAddress {
    pub fn new(server_url: Url, host: impl Into<String>, key: Option<String>) -> Self {
        Self {
            server_url,
            host: host.into(),
            key: key.unwrap_or_else(|| DEFAULT_CHANNEL_KEY.to_string()),
            app_key: None,
        }
    }

    pub fn with_app_key(mut self, app_key: Option<String>) -> Self {
        self.app_key = app_key;
        self
    }

    /// Full URL with `host`, `key`, `version` and optional `app-key` query
    /// parameters.
    pub fn to_url(&self) -> Url {
        let mut url = self.server_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("host", &self.host)
                .append_pair("key", &self.key)
                .append_pair("version", env!("CARGO_PKG_VERSION"));
            if let Some(app_key) = &self.app_key {
                query.append_pair("app-key", app_key);
            }
        }
        url
    }
}
