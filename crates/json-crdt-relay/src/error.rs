use json_crdt::{CodecError, SyncError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors surfaced by a replication session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The value could not be reconciled into the document.
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("update codec: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid base64 payload: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("session is not ready yet")]
    NotReady,

    /// The relay reported a fatal error for this session.
    #[error("relay error: {0}")]
    Relay(String),

    /// The session hit a terminal fault earlier and accepts no more calls.
    #[error("session faulted: {0}")]
    Faulted(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Whether the session can keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Relay(_)
                | SessionError::Faulted(_)
                | SessionError::Transport(_)
                | SessionError::Config(_)
                | SessionError::Closed
        )
    }
}
