//! [`Patch`]: a JSON CRDT patch containing a sequence of operations.

use serde::{Deserialize, Serialize};

use crate::json_crdt_patch::clock::{print_ts, Ts};
use crate::json_crdt_patch::operations::Op;

/// A JSON CRDT Patch: an ordered list of operations.
///
/// Normally created via [`PatchBuilder`](super::patch_builder::PatchBuilder).
/// One committed transaction of a document produces exactly one patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// The list of operations in the patch.
    pub ops: Vec<Op>,
}

impl Patch {
    /// Creates an empty patch with no operations.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the ID of the first operation, if any.
    pub fn get_id(&self) -> Option<Ts> {
        self.ops.first().map(|op| op.id())
    }

    /// Returns the total logical clock span consumed by all operations.
    pub fn span(&self) -> u64 {
        self.ops.iter().map(|op| op.span()).sum()
    }

    /// Returns the logical time expected for the next operation to be inserted.
    ///
    /// Returns 0 if the patch has no operations.
    pub fn next_time(&self) -> u64 {
        match self.ops.last() {
            None => 0,
            Some(op) => op.id().time + op.span(),
        }
    }
}

impl std::fmt::Display for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_str = match self.get_id() {
            Some(id) => print_ts(id),
            None => "(nil)".to_owned(),
        };
        write!(f, "Patch {}!{}", id_str, self.span())?;
        for op in &self.ops {
            write!(f, "\n  {}", op)?;
        }
        Ok(())
    }
}
