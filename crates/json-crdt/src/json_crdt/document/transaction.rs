//! Write access to a [`Document`](super::Document) for the span of one
//! atomic transaction.

use crate::json_crdt::nodes::{CrdtNode, NodeIndex};
use crate::json_crdt_patch::clock::Ts;
use crate::json_crdt_patch::patch_builder::PatchBuilder;

/// A pending batch of edits.
///
/// Reads see the document as it was when the transaction started; edits are
/// recorded into a [`PatchBuilder`] and only reach the document when the
/// transaction closure returns `Ok`.
pub struct Transaction<'a> {
    index: &'a NodeIndex,
    builder: PatchBuilder,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(index: &'a NodeIndex, builder: PatchBuilder) -> Self {
        Self { index, builder }
    }

    /// Look up a node as of the start of the transaction.
    pub fn node(&self, id: Ts) -> Option<&'a CrdtNode> {
        self.index.get(&id)
    }

    pub fn index(&self) -> &'a NodeIndex {
        self.index
    }

    pub fn builder(&mut self) -> &mut PatchBuilder {
        &mut self.builder
    }

    pub(crate) fn into_builder(self) -> PatchBuilder {
        self.builder
    }
}
