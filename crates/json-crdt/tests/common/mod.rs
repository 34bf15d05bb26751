#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use json_crdt::json_crdt::nodes::CrdtNode;
use json_crdt::{Document, Origin, Ts};

/// Collects the origin of every change event a document emits.
pub fn record_events(doc: &mut Document) -> Arc<Mutex<Vec<Origin>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    doc.observe(move |event| sink.lock().unwrap().push(event.origin));
    events
}

/// Collects the encoded update of every local change event.
pub fn record_local_updates(doc: &mut Document) -> Arc<Mutex<Vec<Vec<u8>>>> {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    doc.observe(move |event| {
        if event.origin != Origin::Remote {
            sink.lock().unwrap().push(event.encode_update().unwrap());
        }
    });
    updates
}

pub fn key_id(doc: &Document, obj: Ts, key: &str) -> Ts {
    match doc.node(obj) {
        Some(CrdtNode::Obj(node)) => node.keys[key],
        other => panic!("expected map at {obj}, got {:?}", other.map(|n| n.name())),
    }
}

pub fn array_len(doc: &Document, id: Ts) -> usize {
    match doc.node(id) {
        Some(CrdtNode::Arr(node)) => node.size(),
        other => panic!("expected array at {id}, got {:?}", other.map(|n| n.name())),
    }
}
