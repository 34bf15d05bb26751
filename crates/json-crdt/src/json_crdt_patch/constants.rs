//! Constant timestamps of the JSON CRDT patch protocol.

pub use crate::json_crdt_patch::enums::{SESSION, SYSTEM_SESSION_TIME};

use crate::json_crdt_patch::clock::Ts;

/// ID of the `"main"` root map. Every document owns this node from the
/// start, so all peers agree on its identity without exchanging it.
pub const MAIN: Ts = Ts::new(SESSION::SYSTEM, SYSTEM_SESSION_TIME::MAIN);
