//! Structural reconciliation of plain JSON values into a document.
//!
//! [`synchronize`] makes a CRDT node look like a JSON value while rewriting
//! as little of the node as possible: wherever the value and the node have
//! the same shape (map onto map, array onto array) the node is edited in
//! place and keeps its identity, so concurrent remote edits inside it still
//! merge. A subtree is replaced wholesale only when its shape changed.
//!
//! All edits of one call are committed as a single transaction.

mod error;

pub use error::SyncError;

use serde_json::{Map, Value};

use crate::json_crdt::document::{Document, Origin, Transaction};
use crate::json_crdt::nodes::{ArrNode, CrdtNode, NodeKind, ObjNode};
use crate::json_crdt_patch::clock::{Ts, Tss};

/// What to do with map keys that exist in the node but not in the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Delete them; the node ends up equal to the value.
    #[default]
    Replace,
    /// Leave them alone; the value's keys are added on top.
    Additive,
}

/// Result of [`synchronize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Synced {
    /// A scalar is never wrapped into a node; the caller stores it.
    Scalar(Value),
    /// The container node holding the value.
    Node(Ts),
}

impl Synced {
    pub fn node(&self) -> Option<Ts> {
        match self {
            Synced::Node(id) => Some(*id),
            Synced::Scalar(_) => None,
        }
    }
}

/// Reconcile `value` into `doc`.
///
/// - Without a `target`, containers are built from scratch and the new
///   node's ID is returned (it is not attached anywhere).
/// - With a `target`, the node is edited in place to match `value`. An
///   object needs a map target and an array needs an array target.
/// - Scalars are returned unchanged whatever the target is.
pub fn synchronize(
    doc: &mut Document,
    value: &Value,
    target: Option<Ts>,
    mode: MergeMode,
    origin: Origin,
) -> Result<Synced, SyncError> {
    doc.transact(origin, |txn| Synchronizer { txn, mode }.sync(value, target))
}

struct Synchronizer<'t, 'a> {
    txn: &'t mut Transaction<'a>,
    mode: MergeMode,
}

impl<'t, 'a> Synchronizer<'t, 'a> {
    fn sync(&mut self, value: &Value, target: Option<Ts>) -> Result<Synced, SyncError> {
        let Some(target) = target else {
            return Ok(match value {
                Value::Array(_) | Value::Object(_) => Synced::Node(self.build(value)),
                scalar => Synced::Scalar(scalar.clone()),
            });
        };
        match value {
            Value::Array(items) => {
                let node = self.arr_target(target)?;
                self.sync_arr(node, items)?;
                Ok(Synced::Node(target))
            }
            Value::Object(map) => {
                let node = self.obj_target(target)?;
                self.sync_obj(node, map)?;
                Ok(Synced::Node(target))
            }
            scalar => Ok(Synced::Scalar(scalar.clone())),
        }
    }

    fn lookup(&self, id: Ts) -> Result<&'a CrdtNode, SyncError> {
        self.txn.node(id).ok_or(SyncError::TypeMismatch { id })
    }

    fn arr_target(&self, id: Ts) -> Result<&'a ArrNode, SyncError> {
        match self.lookup(id)? {
            CrdtNode::Arr(node) => Ok(node),
            other => Err(SyncError::ShapeMismatch {
                id,
                expected: NodeKind::Array,
                found: other.kind(),
            }),
        }
    }

    fn obj_target(&self, id: Ts) -> Result<&'a ObjNode, SyncError> {
        match self.lookup(id)? {
            CrdtNode::Obj(node) => Ok(node),
            other => Err(SyncError::ShapeMismatch {
                id,
                expected: NodeKind::Map,
                found: other.kind(),
            }),
        }
    }

    // ── Fresh build ──────────────────────────────────────────────────────

    /// Build a brand-new node tree for `value`.
    fn build(&mut self, value: &Value) -> Ts {
        match value {
            Value::Array(items) => {
                let arr = self.txn.builder().arr();
                let ids: Vec<Ts> = items.iter().map(|item| self.build(item)).collect();
                if !ids.is_empty() {
                    self.txn.builder().ins_arr(arr, arr, ids);
                }
                arr
            }
            Value::Object(map) => {
                let obj = self.txn.builder().obj();
                let pairs: Vec<(String, Ts)> = map
                    .iter()
                    .map(|(key, item)| (key.clone(), self.build(item)))
                    .collect();
                if !pairs.is_empty() {
                    self.txn.builder().ins_obj(obj, pairs);
                }
                obj
            }
            scalar => self.txn.builder().con(scalar.clone()),
        }
    }

    /// Try to reconcile `value` into the existing `child` without replacing
    /// it. Returns `false` if the child has to be replaced.
    fn sync_in_place(&mut self, child: &'a CrdtNode, value: &Value) -> Result<bool, SyncError> {
        match (value, child) {
            (Value::Object(map), CrdtNode::Obj(node)) => {
                self.sync_obj(node, map)?;
                Ok(true)
            }
            (Value::Array(items), CrdtNode::Arr(node)) => {
                self.sync_arr(node, items)?;
                Ok(true)
            }
            (Value::Array(_) | Value::Object(_), _) => Ok(false),
            (scalar, CrdtNode::Con(con)) => Ok(!con.val.is_undefined() && con.view() == *scalar),
            _ => Ok(false),
        }
    }

    // ── Arr ──────────────────────────────────────────────────────────────

    fn sync_arr(&mut self, node: &'a ArrNode, items: &[Value]) -> Result<(), SyncError> {
        let slots = node.slots();
        let shared = slots.len().min(items.len());
        // Slot after which the next element lands; the array's own ID is
        // the head.
        let mut prev = node.id;

        for (&(slot, child_id), item) in slots.iter().zip(items).take(shared) {
            let kept = match self.txn.node(child_id) {
                Some(child) => self.sync_in_place(child, item)?,
                None => false,
            };
            if kept {
                prev = slot;
                continue;
            }
            let fresh = self.build(item);
            let builder = self.txn.builder();
            builder.del(node.id, vec![Tss::new(slot.sid, slot.time, 1)]);
            prev = builder.ins_arr(node.id, prev, vec![fresh]);
        }

        if slots.len() > items.len() {
            let excess: Vec<Tss> = slots[shared..]
                .iter()
                .map(|(slot, _)| Tss::new(slot.sid, slot.time, 1))
                .collect();
            self.txn.builder().del(node.id, excess);
        } else if items.len() > shared {
            let ids: Vec<Ts> = items[shared..].iter().map(|item| self.build(item)).collect();
            self.txn.builder().ins_arr(node.id, prev, ids);
        }
        Ok(())
    }

    // ── Obj ──────────────────────────────────────────────────────────────

    fn sync_obj(&mut self, node: &'a ObjNode, map: &Map<String, Value>) -> Result<(), SyncError> {
        let index = self.txn.index();
        let mut inserts: Vec<(String, Ts)> = Vec::new();

        for (key, value) in map {
            if let Some((_, child)) = node.get(key, index) {
                if self.sync_in_place(child, value)? {
                    continue;
                }
            }
            inserts.push((key.clone(), self.build(value)));
        }

        if self.mode == MergeMode::Replace {
            let stale: Vec<String> = node
                .entries(index)
                .filter(|(key, _)| !map.contains_key(key.as_str()))
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                let undef = self.txn.builder().undef();
                inserts.push((key, undef));
            }
        }

        if !inserts.is_empty() {
            self.txn.builder().ins_obj(node.id, inserts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_crdt_patch::constants::MAIN;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn doc_with(value: Value) -> Document {
        let mut doc = Document::new(100_000);
        synchronize(&mut doc, &value, Some(MAIN), MergeMode::Replace, Origin::Local).unwrap();
        doc
    }

    fn key_id(doc: &Document, obj: Ts, key: &str) -> Ts {
        match doc.node(obj) {
            Some(CrdtNode::Obj(node)) => node.keys[key],
            _ => panic!("not a map"),
        }
    }

    #[test]
    fn scalar_is_returned_as_is() {
        let mut doc = Document::new(100_000);
        let out = synchronize(&mut doc, &json!(5), Some(MAIN), MergeMode::Replace, Origin::Local);
        assert_eq!(out, Ok(Synced::Scalar(json!(5))));
        assert_eq!(doc.materialize(), json!({}));
    }

    #[test]
    fn fresh_build_without_target() {
        let mut doc = Document::new(100_000);
        let value = json!({ "a": 1, "b": [1, 2, 3] });
        let out = synchronize(&mut doc, &value, None, MergeMode::Replace, Origin::Local).unwrap();
        let id = out.node().unwrap();
        assert_eq!(doc.view(id), value);
        let b = key_id(&doc, id, "b");
        match doc.node(b) {
            Some(CrdtNode::Arr(arr)) => assert_eq!(arr.size(), 3),
            other => panic!("expected array, got {:?}", other.map(|n| n.name())),
        }
    }

    #[test]
    fn replace_mode_drops_missing_keys() {
        let mut doc = doc_with(json!({ "a": 1, "b": 2 }));
        let a_before = key_id(&doc, MAIN, "a");
        synchronize(
            &mut doc,
            &json!({ "a": 1, "c": 3 }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        assert_eq!(doc.materialize(), json!({ "a": 1, "c": 3 }));
        assert_eq!(key_id(&doc, MAIN, "a"), a_before);
    }

    #[test]
    fn additive_mode_keeps_missing_keys() {
        let mut doc = doc_with(json!({ "a": 1, "b": 2 }));
        synchronize(
            &mut doc,
            &json!({ "c": 3 }),
            Some(MAIN),
            MergeMode::Additive,
            Origin::Local,
        )
        .unwrap();
        assert_eq!(doc.materialize(), json!({ "a": 1, "b": 2, "c": 3 }));
    }

    #[test]
    fn array_edits_in_place() {
        let mut doc = doc_with(json!({ "list": [1, 2, 3] }));
        let list = key_id(&doc, MAIN, "list");
        let first_slot = match doc.node(list) {
            Some(CrdtNode::Arr(arr)) => arr.slots()[0].0,
            _ => unreachable!(),
        };
        synchronize(
            &mut doc,
            &json!({ "list": [1, 9, 3, 4] }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        assert_eq!(doc.materialize(), json!({ "list": [1, 9, 3, 4] }));
        assert_eq!(key_id(&doc, MAIN, "list"), list);
        match doc.node(list) {
            Some(CrdtNode::Arr(arr)) => {
                assert_eq!(arr.size(), 4);
                assert_eq!(arr.slots()[0].0, first_slot);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn array_truncates_excess() {
        let mut doc = doc_with(json!({ "list": [1, 2, 3, 4] }));
        synchronize(
            &mut doc,
            &json!({ "list": [1, 2] }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        assert_eq!(doc.materialize(), json!({ "list": [1, 2] }));
    }

    #[test]
    fn array_replacement_at_head_keeps_order() {
        let mut doc = doc_with(json!({ "list": ["a", "b"] }));
        synchronize(
            &mut doc,
            &json!({ "list": ["z", "b", "c"] }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        assert_eq!(doc.materialize(), json!({ "list": ["z", "b", "c"] }));
    }

    #[test]
    fn nested_containers_keep_identity() {
        let mut doc = doc_with(json!({ "user": { "name": "ann", "tags": ["x"] } }));
        let user = key_id(&doc, MAIN, "user");
        let tags = key_id(&doc, user, "tags");
        synchronize(
            &mut doc,
            &json!({ "user": { "name": "bob", "tags": ["x", "y"] } }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        assert_eq!(key_id(&doc, MAIN, "user"), user);
        assert_eq!(key_id(&doc, user, "tags"), tags);
        assert_eq!(
            doc.materialize(),
            json!({ "user": { "name": "bob", "tags": ["x", "y"] } })
        );
    }

    #[test]
    fn shape_change_replaces_subtree() {
        let mut doc = doc_with(json!({ "v": { "a": 1 } }));
        let before = key_id(&doc, MAIN, "v");
        synchronize(
            &mut doc,
            &json!({ "v": [1] }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Local,
        )
        .unwrap();
        assert_ne!(key_id(&doc, MAIN, "v"), before);
        assert_eq!(doc.materialize(), json!({ "v": [1] }));
    }

    #[test]
    fn shape_mismatch_on_target() {
        let mut doc = doc_with(json!({ "list": [1] }));
        let list = key_id(&doc, MAIN, "list");
        let err = synchronize(&mut doc, &json!({ "a": 1 }), Some(list), MergeMode::Replace, Origin::Local)
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::ShapeMismatch {
                id: list,
                expected: NodeKind::Map,
                found: NodeKind::Array,
            }
        );
        let err = synchronize(&mut doc, &json!([1]), Some(MAIN), MergeMode::Replace, Origin::Local)
            .unwrap_err();
        assert!(matches!(err, SyncError::ShapeMismatch { expected: NodeKind::Array, .. }));
    }

    #[test]
    fn unknown_target_is_type_mismatch() {
        let mut doc = Document::new(100_000);
        let missing = Ts::new(5, 5);
        let err = synchronize(&mut doc, &json!({}), Some(missing), MergeMode::Replace, Origin::Local)
            .unwrap_err();
        assert_eq!(err, SyncError::TypeMismatch { id: missing });
    }

    #[test]
    fn failed_sync_writes_nothing() {
        let mut doc = doc_with(json!({ "a": { "b": 1 } }));
        let a = key_id(&doc, MAIN, "a");
        let before = doc.clock().time;
        let err = synchronize(&mut doc, &json!([]), Some(a), MergeMode::Replace, Origin::Local);
        assert!(err.is_err());
        assert_eq!(doc.clock().time, before);
        assert_eq!(doc.materialize(), json!({ "a": { "b": 1 } }));
    }

    #[test]
    fn no_op_sync_emits_no_event() {
        let value = json!({ "a": [1, { "b": null }], "c": "s" });
        let mut doc = doc_with(value.clone());
        let events = Arc::new(Mutex::new(0));
        let counter = events.clone();
        doc.observe(move |_| *counter.lock().unwrap() += 1);
        synchronize(&mut doc, &value, Some(MAIN), MergeMode::Replace, Origin::Local).unwrap();
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[test]
    fn one_event_per_call() {
        let mut doc = doc_with(json!({ "a": [1, 2], "b": 1 }));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        doc.observe(move |e| sink.lock().unwrap().push(e.origin));
        synchronize(
            &mut doc,
            &json!({ "a": [3, 4, 5], "c": { "d": 1 } }),
            Some(MAIN),
            MergeMode::Replace,
            Origin::Remote,
        )
        .unwrap();
        assert_eq!(*events.lock().unwrap(), vec![Origin::Remote]);
    }
}
