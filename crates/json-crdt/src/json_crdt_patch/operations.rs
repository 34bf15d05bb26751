//! JSON CRDT patch operations as a single Rust enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json_crdt_patch::clock::{print_ts, Ts, Tss};

// ── ConValue ───────────────────────────────────────────────────────────────

/// The value stored in a `new_con` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConValue {
    /// A JSON scalar: null, boolean, number or string.
    Val(Value),
    /// Tombstone written into a map slot to delete its key.
    Undefined,
}

impl ConValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ConValue::Undefined)
    }
}

// ── Operation ──────────────────────────────────────────────────────────────

/// A single JSON CRDT patch operation.
///
/// Each variant carries an `id: Ts` identifying the operation in the
/// global logical clock space.
///
/// Span (the number of clock ticks consumed):
/// - Most operations consume 1 tick.
/// - `InsArr` consumes `data.len()` ticks, one per inserted slot.
/// - `Nop` consumes `len` ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // ── Creation operations ──────────────────────────────────────────────
    /// Create a new constant `con` value.
    NewCon { id: Ts, val: ConValue },
    /// Create a new LWW-Map `obj` container.
    NewObj { id: Ts },
    /// Create a new RGA-Array `arr` container.
    NewArr { id: Ts },

    // ── Mutation operations ──────────────────────────────────────────────
    /// Set key→value pairs in an `obj` map.
    InsObj {
        id: Ts,
        obj: Ts,
        data: Vec<(String, Ts)>,
    },
    /// Insert elements into an `arr` RGA after the slot `after`
    /// (`after == obj` inserts at the head).
    InsArr {
        id: Ts,
        obj: Ts,
        after: Ts,
        data: Vec<Ts>,
    },
    /// Delete slot ranges of an `arr`.
    Del { id: Ts, obj: Ts, what: Vec<Tss> },
    /// No-op, skips clock cycles without performing any CRDT action.
    Nop { id: Ts, len: u64 },
}

impl Op {
    /// Returns the ID (first timestamp) of this operation.
    pub fn id(&self) -> Ts {
        match self {
            Op::NewCon { id, .. }
            | Op::NewObj { id }
            | Op::NewArr { id }
            | Op::InsObj { id, .. }
            | Op::InsArr { id, .. }
            | Op::Del { id, .. }
            | Op::Nop { id, .. } => *id,
        }
    }

    /// Number of logical clock cycles consumed by this operation.
    pub fn span(&self) -> u64 {
        match self {
            Op::InsArr { data, .. } => data.len() as u64,
            Op::Nop { len, .. } => *len,
            _ => 1,
        }
    }

    /// Short mnemonic name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Op::NewCon { .. } => "new_con",
            Op::NewObj { .. } => "new_obj",
            Op::NewArr { .. } => "new_arr",
            Op::InsObj { .. } => "ins_obj",
            Op::InsArr { .. } => "ins_arr",
            Op::Del { .. } => "del",
            Op::Nop { .. } => "nop",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.id();
        let span = self.span();
        let base = if span > 1 {
            format!("{} {}!{}", self.name(), print_ts(id), span)
        } else {
            format!("{} {}", self.name(), print_ts(id))
        };
        match self {
            Op::NewCon { val, .. } => match val {
                ConValue::Val(v) => write!(f, "{} {{ {} }}", base, v),
                ConValue::Undefined => write!(f, "{} {{ undefined }}", base),
            },
            Op::InsObj { obj, data, .. } => {
                let pairs: Vec<_> = data
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, print_ts(*v)))
                    .collect();
                write!(f, "{}, obj = {} {{ {} }}", base, print_ts(*obj), pairs.join(", "))
            }
            Op::InsArr {
                obj, after, data, ..
            } => {
                let ids: Vec<_> = data.iter().map(|v| print_ts(*v)).collect();
                write!(
                    f,
                    "{}, obj = {} {{ {} ← {} }}",
                    base,
                    print_ts(*obj),
                    print_ts(*after),
                    ids.join(", ")
                )
            }
            Op::Del { obj, what, .. } => {
                let spans: Vec<_> = what
                    .iter()
                    .map(|s| format!("{}!{}", print_ts(s.ts()), s.span))
                    .collect();
                write!(
                    f,
                    "{}, obj = {} {{ {} }}",
                    base,
                    print_ts(*obj),
                    spans.join(", ")
                )
            }
            _ => write!(f, "{}", base),
        }
    }
}
