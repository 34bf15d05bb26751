use thiserror::Error;

use crate::json_crdt::nodes::NodeKind;
use crate::json_crdt_patch::clock::Ts;

/// Error produced when a value cannot be reconciled into a document.
///
/// Nothing is written to the document when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A container value met an existing node of another kind.
    #[error("cannot synchronize {expected} value onto {found} node {id}")]
    ShapeMismatch {
        id: Ts,
        expected: NodeKind,
        found: NodeKind,
    },
    /// The target handle does not resolve to a node of the document.
    #[error("node {id} does not exist in this document")]
    TypeMismatch { id: Ts },
}
