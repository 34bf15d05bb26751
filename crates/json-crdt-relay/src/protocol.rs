//! Relay message envelope.
//!
//! Every frame is a JSON object discriminated by `type`. Binary document
//! payloads travel as standard base64 strings.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// Severity of a relay `console` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Client to relay: the candidate snapshot. Relay to client: the
    /// canonical snapshot of a peer that got there first.
    Init {
        #[serde(rename = "initialEncodedState")]
        initial_encoded_state: String,
    },
    /// Relay to client: this client's candidate is canonical.
    First,
    /// Incremental update, in both directions.
    Update {
        #[serde(rename = "encodedUpdate")]
        encoded_update: String,
    },
    /// Relay to client: fatal.
    Error { message: String },
    /// Relay to client: diagnostics for the client log.
    Console {
        level: ConsoleLevel,
        #[serde(default)]
        logs: Vec<Value>,
    },
}

impl Message {
    pub fn init(snapshot: &[u8]) -> Self {
        Message::Init {
            initial_encoded_state: base64::engine::general_purpose::STANDARD.encode(snapshot),
        }
    }

    pub fn update(update: &[u8]) -> Self {
        Message::Update {
            encoded_update: base64::engine::general_purpose::STANDARD.encode(update),
        }
    }

    /// Decoded binary payload of an `init` or `update` message.
    pub fn decode_payload(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let encoded = match self {
            Message::Init {
                initial_encoded_state,
            } => initial_encoded_state,
            Message::Update { encoded_update } => encoded_update,
            _ => return Ok(None),
        };
        Ok(Some(
            base64::engine::general_purpose::STANDARD.decode(encoded)?,
        ))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Init { .. } => "init",
            Message::First => "first",
            Message::Update { .. } => "update",
            Message::Error { .. } => "error",
            Message::Console { .. } => "console",
        }
    }

    pub fn to_text(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::MalformedMessage(e.to_string()))
    }

    pub fn from_text(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::MalformedMessage(e.to_string()))
    }
}
