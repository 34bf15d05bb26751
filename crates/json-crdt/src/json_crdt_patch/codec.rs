//! Binary codec for document updates.
//!
//! An update is an ordered list of patches encoded as CBOR. A full snapshot
//! is simply the update holding every patch a document has applied, so the
//! receiving side never needs to tell the two apart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::json_crdt_patch::patch::Patch;

/// Error returned when an update cannot be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode update: {0}")]
    Encode(String),
    #[error("failed to decode update: {0}")]
    Decode(String),
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    patches: &'a [Patch],
}

#[derive(Deserialize)]
struct UpdateOwned {
    patches: Vec<Patch>,
}

/// Encodes `patches` into update bytes.
pub fn encode(patches: &[Patch]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(&UpdateRef { patches }, &mut buf)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes update bytes back into patches.
pub fn decode(data: &[u8]) -> Result<Vec<Patch>, CodecError> {
    let update: UpdateOwned =
        ciborium::from_reader(data).map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(update.patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_crdt_patch::clock::{ts, Tss};
    use crate::json_crdt_patch::patch_builder::PatchBuilder;
    use serde_json::json;

    #[test]
    fn preserves_every_op_kind() {
        let mut b = PatchBuilder::new(70000, 3);
        let obj = b.obj();
        let arr = b.arr();
        let n = b.con(json!(1.5));
        let s = b.con(json!("x"));
        let slot = b.ins_arr(arr, arr, vec![n, s]);
        b.del(arr, vec![Tss::new(slot.sid, slot.time, 1)]);
        let gone = b.undef();
        b.ins_obj(obj, vec![("a".into(), arr), ("b".into(), gone)]);
        b.nop(2);
        let patch = b.flush();

        let bytes = encode(std::slice::from_ref(&patch)).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, vec![patch]);
        assert_eq!(decoded[0].get_id(), Some(ts(70000, 3)));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
