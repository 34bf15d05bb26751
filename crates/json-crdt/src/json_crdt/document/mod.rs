//! JSON CRDT document.
//!
//! A [`Document`] owns the node arena, a vector clock, the log of every
//! patch it has applied and the change observers. It is edited in two ways:
//!
//! - [`Document::transact`] builds a patch locally and commits it atomically;
//! - [`Document::apply_update`] replays encoded patches received from a peer.
//!
//! Either path emits at most one [`ChangeEvent`] per call, tagged with the
//! [`Origin`] the caller passed in.

pub mod transaction;

pub use transaction::Transaction;

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::nodes::{ArrNode, ConNode, CrdtNode, NodeIndex, ObjNode};
use crate::json_crdt_patch::clock::{ClockVector, Ts};
use crate::json_crdt_patch::codec::{self, CodecError};
use crate::json_crdt_patch::constants::MAIN;
use crate::json_crdt_patch::enums::{random_sid, SYSTEM_SESSION_TIME};
use crate::json_crdt_patch::operations::Op;
use crate::json_crdt_patch::patch::Patch;
use crate::json_crdt_patch::patch_builder::PatchBuilder;

/// Provenance of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Authored on this replica.
    Local,
    /// Replayed from an update received from a peer.
    Remote,
}

/// Notification emitted once per committed transaction or applied update.
#[derive(Debug)]
pub struct ChangeEvent<'a> {
    pub origin: Origin,
    /// The operations that actually changed the document.
    pub patch: &'a Patch,
}

impl ChangeEvent<'_> {
    /// Encodes the change as incremental update bytes.
    pub fn encode_update(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(std::slice::from_ref(self.patch))
    }
}

/// Handle returned by [`Document::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&ChangeEvent<'_>) + Send>;

/// In-memory JSON CRDT document.
pub struct Document {
    index: NodeIndex,
    clock: ClockVector,
    /// Per session: the first logical time not yet applied.
    applied: HashMap<u64, u64>,
    log: Vec<Patch>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl Document {
    /// Create an empty document whose local edits use session `sid`.
    pub fn new(sid: u64) -> Self {
        let mut index = NodeIndex::new();
        index.insert(MAIN, CrdtNode::Obj(ObjNode::new(MAIN)));
        Self {
            index,
            clock: ClockVector::new(sid, SYSTEM_SESSION_TIME::FIRST_PEER_TIME),
            applied: HashMap::new(),
            log: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Create an empty document with a random session ID.
    pub fn random() -> Self {
        Self::new(random_sid())
    }

    pub fn sid(&self) -> u64 {
        self.clock.sid
    }

    pub fn clock(&self) -> &ClockVector {
        &self.clock
    }

    /// ID of the `"main"` root map.
    pub fn main(&self) -> Ts {
        MAIN
    }

    pub fn node(&self, id: Ts) -> Option<&CrdtNode> {
        self.index.get(&id)
    }

    pub fn index(&self) -> &NodeIndex {
        &self.index
    }

    /// JSON view of the node `id`; `null` if the document does not know it.
    pub fn view(&self, id: Ts) -> Value {
        match self.index.get(&id) {
            Some(node) => node.view(&self.index),
            None => Value::Null,
        }
    }

    /// JSON view of the `"main"` root map.
    pub fn materialize(&self) -> Value {
        self.view(MAIN)
    }

    // ── Observers ─────────────────────────────────────────────────────────

    /// Register a callback invoked after every change.
    pub fn observe<F>(&mut self, f: F) -> ObserverId
    where
        F: FnMut(&ChangeEvent<'_>) + Send + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(f)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(other, _)| *other != id);
        self.observers.len() != before
    }

    // ── Editing ───────────────────────────────────────────────────────────

    /// Run `f` as one atomic transaction.
    ///
    /// If `f` returns `Ok`, the patch it built is applied and observers see a
    /// single [`ChangeEvent`] (none if the patch is empty). If `f` returns
    /// `Err`, the document is left untouched.
    pub fn transact<R, E, F>(&mut self, origin: Origin, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    {
        let builder = PatchBuilder::new(self.clock.sid, self.clock.time);
        let mut txn = Transaction::new(&self.index, builder);
        let result = f(&mut txn)?;
        let patch = txn.into_builder().flush();
        if !patch.is_empty() {
            for op in &patch.ops {
                self.apply_operation(op);
            }
            self.commit(patch, origin);
        }
        Ok(result)
    }

    /// Decode `data` and apply every operation this document has not seen yet.
    ///
    /// Both full snapshots and incremental updates are accepted; replaying
    /// an update twice is a no-op. An update whose timestamps run past the
    /// end of the clock is rejected as a whole.
    pub fn apply_update(&mut self, data: &[u8], origin: Origin) -> Result<(), CodecError> {
        let patches = codec::decode(data)?;
        for op in patches.iter().flat_map(|p| &p.ops) {
            check_span(op)?;
        }
        let mut fresh = Patch::new();
        let mut skipped = 0usize;
        for op in patches.into_iter().flat_map(|p| p.ops) {
            if self.is_applied(&op) {
                skipped += 1;
                continue;
            }
            self.apply_operation(&op);
            fresh.ops.push(op);
        }
        tracing::trace!(
            sid = self.clock.sid,
            applied = fresh.ops.len(),
            skipped,
            "applied update"
        );
        if !fresh.is_empty() {
            self.commit(fresh, origin);
        }
        Ok(())
    }

    /// Encode every patch applied so far as one update.
    pub fn snapshot(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(&self.log)
    }

    fn commit(&mut self, patch: Patch, origin: Origin) {
        self.log.push(patch);
        let Some(patch) = self.log.last() else {
            return;
        };
        let event = ChangeEvent { origin, patch };
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    fn is_applied(&self, op: &Op) -> bool {
        let id = op.id();
        self.applied
            .get(&id.sid)
            .is_some_and(|next| id.time + op.span() <= *next)
    }

    /// Apply a single operation to the arena.
    fn apply_operation(&mut self, op: &Op) {
        let id = op.id();
        self.clock.observe(id, op.span());
        let end = id.time + op.span();
        let next = self.applied.entry(id.sid).or_insert(end);
        if *next < end {
            *next = end;
        }

        match op {
            // ── Creation operations ────────────────────────────────────────
            Op::NewCon { id, val } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| CrdtNode::Con(ConNode::new(*id, val.clone())));
            }
            Op::NewObj { id } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| CrdtNode::Obj(ObjNode::new(*id)));
            }
            Op::NewArr { id } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| CrdtNode::Arr(ArrNode::new(*id)));
            }

            // ── Mutation operations ────────────────────────────────────────
            Op::InsObj { obj, data, .. } => {
                if let Some(CrdtNode::Obj(node)) = self.index.get_mut(obj) {
                    for (key, val_id) in data {
                        // A container never holds a node older than itself.
                        if node.id.time >= val_id.time {
                            continue;
                        }
                        node.put(key, *val_id);
                    }
                }
            }
            Op::InsArr {
                id,
                obj,
                after,
                data,
            } => {
                if let Some(CrdtNode::Arr(node)) = self.index.get_mut(obj) {
                    let filtered: Vec<Ts> = data
                        .iter()
                        .filter(|stamp| node.id.time < stamp.time)
                        .copied()
                        .collect();
                    if filtered.len() == data.len() {
                        node.ins(*after, *id, filtered);
                    }
                }
            }
            Op::Del { obj, what, .. } => {
                if let Some(CrdtNode::Arr(node)) = self.index.get_mut(obj) {
                    node.delete(what);
                }
            }
            Op::Nop { .. } => {}
        }
    }
}

/// Every timestamp an operation covers must fit the clock.
fn check_span(op: &Op) -> Result<(), CodecError> {
    let fits = |time: u64, span: u64| time.checked_add(span).is_some();
    let ok = fits(op.id().time, op.span())
        && match op {
            Op::Del { what, .. } => what.iter().all(|t| fits(t.time, t.span)),
            _ => true,
        };
    if ok {
        Ok(())
    } else {
        Err(CodecError::Decode(format!(
            "{} at {} overflows the logical clock",
            op.name(),
            op.id()
        )))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("clock", &self.clock)
            .field("nodes", &self.index.len())
            .field("patches", &self.log.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
