//! JSON CRDT document model and node types.
//!
//! This module provides:
//! - The node arena and node types ([`nodes`])
//! - The [`Document`] with atomic transactions, change observers and
//!   update/snapshot exchange ([`document`])

pub mod document;
pub mod nodes;

pub use document::{ChangeEvent, Document, ObserverId, Origin, Transaction};
pub use nodes::{CrdtNode, NodeIndex, NodeKind};
