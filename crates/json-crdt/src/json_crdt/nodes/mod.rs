//! JSON CRDT node types.
//!
//! | Rust type  | Semantics                                    |
//! |------------|----------------------------------------------|
//! | `ConNode`  | Immutable scalar constant (or key tombstone) |
//! | `ObjNode`  | LWW key→value map                            |
//! | `ArrNode`  | RGA array of node references                 |
//!
//! Nodes live in a [`NodeIndex`] arena keyed by their creation timestamp.
//! Containers only ever hold timestamps of other nodes, never the nodes
//! themselves, so replacing or deleting a subtree cannot leave a dangling
//! reference behind: the old nodes simply become unreachable.

pub mod rga;

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::json_crdt_patch::clock::{Ts, Tss};
use crate::json_crdt_patch::operations::ConValue;
use rga::Rga;

// ── NodeKind ──────────────────────────────────────────────────────────────

/// Coarse shape of a node or of a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Map,
    Array,
}

impl NodeKind {
    /// Shape of a plain JSON value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Object(_) => NodeKind::Map,
            Value::Array(_) => NodeKind::Array,
            _ => NodeKind::Scalar,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Scalar => "scalar",
            NodeKind::Map => "map",
            NodeKind::Array => "array",
        })
    }
}

// ── ConNode ───────────────────────────────────────────────────────────────

/// Immutable constant node.
#[derive(Debug, Clone)]
pub struct ConNode {
    pub id: Ts,
    pub val: ConValue,
}

impl ConNode {
    pub fn new(id: Ts, val: ConValue) -> Self {
        Self { id, val }
    }

    pub fn view(&self) -> Value {
        match &self.val {
            ConValue::Val(v) => v.clone(),
            ConValue::Undefined => Value::Null,
        }
    }
}

// ── ObjNode ───────────────────────────────────────────────────────────────

/// Last-write-wins object (map from string keys to node IDs).
///
/// Keys enumerate in the order they were first written on this replica.
#[derive(Debug, Clone)]
pub struct ObjNode {
    pub id: Ts,
    /// key → winning node ID
    pub keys: IndexMap<String, Ts>,
}

impl ObjNode {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            keys: IndexMap::new(),
        }
    }

    /// Insert a key, keeping it only if `new_id` is newer than the existing
    /// value. Returns the old ID if replaced.
    pub fn put(&mut self, key: &str, new_id: Ts) -> Option<Ts> {
        match self.keys.get(key).copied() {
            Some(old) if new_id <= old => None,
            old => {
                self.keys.insert(key.to_string(), new_id);
                old
            }
        }
    }

    /// Returns the node currently bound to `key`, skipping deleted keys.
    pub fn get<'a>(&self, key: &str, index: &'a NodeIndex) -> Option<(Ts, &'a CrdtNode)> {
        let id = *self.keys.get(key)?;
        let node = index.get(&id)?;
        (!node.is_undefined()).then_some((id, node))
    }

    /// Iterate live `(key, node)` entries.
    pub fn entries<'s, 'a>(
        &'s self,
        index: &'a NodeIndex,
    ) -> impl Iterator<Item = (&'s String, &'a CrdtNode)> + 's
    where
        'a: 's,
    {
        self.keys.iter().filter_map(move |(key, id)| {
            index
                .get(id)
                .filter(|node| !node.is_undefined())
                .map(|node| (key, node))
        })
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        let mut map = Map::new();
        for (key, node) in self.entries(index) {
            map.insert(key.clone(), node.view(index));
        }
        Value::Object(map)
    }
}

// ── ArrNode ───────────────────────────────────────────────────────────────

/// RGA array of node-ID references.
#[derive(Debug, Clone)]
pub struct ArrNode {
    pub id: Ts,
    pub rga: Rga,
}

impl ArrNode {
    pub fn new(id: Ts) -> Self {
        Self { id, rga: Rga::new() }
    }

    /// Insert node IDs after the slot `after`. Passing the array's own ID
    /// inserts at the head.
    pub fn ins(&mut self, after: Ts, id: Ts, data: Vec<Ts>) {
        let after = (after != self.id).then_some(after);
        self.rga.insert(after, id, data);
    }

    pub fn delete(&mut self, spans: &[Tss]) {
        self.rga.delete(spans);
    }

    /// Live `(slot_id, node_id)` pairs in order.
    pub fn slots(&self) -> Vec<(Ts, Ts)> {
        self.rga.slots().collect()
    }

    /// Number of live elements in this array.
    pub fn size(&self) -> usize {
        self.rga
            .iter_live()
            .map(|c| c.span as usize)
            .sum()
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        let items = self
            .rga
            .slots()
            .map(|(_, id)| match index.get(&id) {
                Some(node) => node.view(index),
                None => Value::Null,
            })
            .collect();
        Value::Array(items)
    }
}

// ── CrdtNode enum ─────────────────────────────────────────────────────────

/// All possible CRDT node types.
#[derive(Debug, Clone)]
pub enum CrdtNode {
    Con(ConNode),
    Obj(ObjNode),
    Arr(ArrNode),
}

impl CrdtNode {
    pub fn id(&self) -> Ts {
        match self {
            Self::Con(n) => n.id,
            Self::Obj(n) => n.id,
            Self::Arr(n) => n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Con(_) => NodeKind::Scalar,
            Self::Obj(_) => NodeKind::Map,
            Self::Arr(_) => NodeKind::Array,
        }
    }

    /// `true` for the tombstone constant that marks a deleted map key.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Con(n) if n.val.is_undefined())
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        match self {
            Self::Con(n) => n.view(),
            Self::Obj(n) => n.view(index),
            Self::Arr(n) => n.view(index),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Con(_) => "con",
            Self::Obj(_) => "obj",
            Self::Arr(_) => "arr",
        }
    }
}

// ── NodeIndex ─────────────────────────────────────────────────────────────

/// Arena of every node a document has seen, keyed by timestamp ID.
pub type NodeIndex = HashMap<Ts, CrdtNode>;
