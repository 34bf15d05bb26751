//! [`PatchBuilder`]: fluent builder for constructing [`Patch`]es.

use serde_json::Value;

use crate::json_crdt_patch::clock::{LogicalClock, Ts, Tss};
use crate::json_crdt_patch::operations::{ConValue, Op};
use crate::json_crdt_patch::patch::Patch;

/// Utility for constructing a [`Patch`] operation by operation.
///
/// Every creation or mutation method allocates fresh timestamps from the
/// builder's clock, so IDs returned by earlier calls can be referenced by
/// later operations of the same patch.
#[derive(Debug, Clone)]
pub struct PatchBuilder {
    pub clock: LogicalClock,
    pub patch: Patch,
}

impl PatchBuilder {
    /// Creates a new builder whose first operation gets `ts(sid, time)`.
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            clock: LogicalClock::new(sid, time),
            patch: Patch::new(),
        }
    }

    /// Returns the current patch and resets the builder.
    pub fn flush(&mut self) -> Patch {
        std::mem::take(&mut self.patch)
    }

    // ── Creation operations ────────────────────────────────────────────────

    /// Create a new `con` constant holding a JSON scalar.
    pub fn con(&mut self, val: Value) -> Ts {
        debug_assert!(!val.is_array() && !val.is_object());
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewCon {
            id,
            val: ConValue::Val(val),
        });
        id
    }

    /// Create a new `con` tombstone used to delete map keys.
    pub fn undef(&mut self) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewCon {
            id,
            val: ConValue::Undefined,
        });
        id
    }

    /// Create a new `obj` LWW-Map.
    pub fn obj(&mut self) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewObj { id });
        id
    }

    /// Create a new `arr` RGA-Array.
    pub fn arr(&mut self) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewArr { id });
        id
    }

    // ── Mutation operations ────────────────────────────────────────────────

    /// Set key→value pairs in an `obj` map.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty.
    pub fn ins_obj(&mut self, obj: Ts, data: Vec<(String, Ts)>) -> Ts {
        assert!(!data.is_empty(), "EMPTY_TUPLES");
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::InsObj { id, obj, data });
        id
    }

    /// Insert node references into an `arr` after the slot `after`.
    ///
    /// Returns the ID of the first inserted slot; slot `i` has ID
    /// `first + i`.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty.
    pub fn ins_arr(&mut self, obj: Ts, after: Ts, data: Vec<Ts>) -> Ts {
        assert!(!data.is_empty(), "EMPTY_ARRAY");
        let id = self.clock.tick(data.len() as u64);
        self.patch.ops.push(Op::InsArr {
            id,
            obj,
            after,
            data,
        });
        id
    }

    /// Delete slot ranges of an `arr`.
    pub fn del(&mut self, obj: Ts, what: Vec<Tss>) -> Ts {
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::Del { id, obj, what });
        id
    }

    /// Skip `len` clock cycles.
    pub fn nop(&mut self, len: u64) -> Ts {
        let id = self.clock.tick(len);
        self.patch.ops.push(Op::Nop { id, len });
        id
    }
}
