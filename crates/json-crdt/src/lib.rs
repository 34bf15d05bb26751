//! json-crdt: a small JSON CRDT document model.
//!
//! Provides the patch protocol, the document (node arena, transactions,
//! change observers, update/snapshot exchange) and structural
//! reconciliation of plain JSON values into a document.

pub mod json_crdt_patch;
pub mod json_crdt;
pub mod json_crdt_sync;

pub use json_crdt::{ChangeEvent, Document, Origin};
pub use json_crdt_patch::{CodecError, Ts, MAIN};
pub use json_crdt_sync::{synchronize, MergeMode, SyncError, Synced};
