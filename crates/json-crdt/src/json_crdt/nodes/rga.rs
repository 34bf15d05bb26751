//! Simplified RGA (Replicated Growable Array) of node references.
//!
//! Uses a flat `Vec<Chunk>` instead of a balanced tree: O(n) per operation,
//! which is correct but not optimised for very large arrays.

use crate::json_crdt_patch::clock::{contains_id, Ts, Tss};

// ── Chunk ─────────────────────────────────────────────────────────────────

/// One chunk in the RGA sequence.
///
/// A chunk represents a contiguous run of slots all inserted by the same
/// operation. Slots within a chunk carry consecutive timestamps
/// `id, id+1, id+2, ...`.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Timestamp of the *first* slot in this chunk.
    pub id: Ts,
    /// Number of slots in this chunk (including deleted ones).
    pub span: u64,
    /// The node IDs held by the slots. `None` once the chunk is a tombstone.
    pub data: Option<Vec<Ts>>,
}

impl Chunk {
    pub fn new(id: Ts, data: Vec<Ts>) -> Self {
        Self {
            id,
            span: data.len() as u64,
            data: Some(data),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.data.is_none()
    }

    /// Split at logical offset `at`, keeping `[0, at)` and returning the rest.
    fn split_off(&mut self, at: u64) -> Chunk {
        let right = Chunk {
            id: Ts::new(self.id.sid, self.id.time + at),
            span: self.span - at,
            data: self.data.as_mut().map(|d| d.split_off(at as usize)),
        };
        self.span = at;
        right
    }
}

// ── Rga ───────────────────────────────────────────────────────────────────

/// A linear-scan RGA sequence.
#[derive(Debug, Clone, Default)]
pub struct Rga {
    pub chunks: Vec<Chunk>,
}

impl Rga {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Find the chunk index whose ID range contains `ts`, or `None`.
    pub fn find_by_id(&self, ts: Ts) -> Option<usize> {
        self.chunks
            .iter()
            .position(|c| contains_id(c.id, c.span, ts))
    }

    /// Insert `data` with first slot ID `id` right after the slot `after`,
    /// or at the head when `after` is `None`.
    ///
    /// When `after` falls in the middle of a multi-slot chunk the chunk is
    /// split so the insertion lands immediately after the targeted slot.
    /// Concurrent inserts at the same position are ordered by descending
    /// timestamp: a newer chunk goes further left.
    pub fn insert(&mut self, after: Option<Ts>, id: Ts, data: Vec<Ts>) {
        if data.is_empty() || self.find_by_id(id).is_some() {
            return;
        }
        let insert_pos = match after {
            None => 0,
            Some(after) => match self.find_by_id(after) {
                Some(idx) => {
                    let chunk = &self.chunks[idx];
                    let offset = after.time - chunk.id.time + 1;
                    if offset < chunk.span {
                        let right = self.chunks[idx].split_off(offset);
                        self.chunks.insert(idx + 1, right);
                    }
                    idx + 1
                }
                None => self.chunks.len(),
            },
        };

        let mut pos = insert_pos;
        while pos < self.chunks.len() && self.chunks[pos].id > id {
            pos += 1;
        }
        self.chunks.insert(pos, Chunk::new(id, data));
    }

    /// Delete all slots covered by the given timestamp spans.
    ///
    /// Chunks that are only partially covered are split at the deletion
    /// boundaries so that only the targeted slots are removed.
    pub fn delete(&mut self, spans: &[Tss]) {
        for tss in spans {
            let del_start = tss.time;
            let del_end = tss.time + tss.span;

            let mut i = 0;
            while i < self.chunks.len() {
                let chunk = &self.chunks[i];
                let chunk_start = chunk.id.time;
                let chunk_end = chunk.id.time + chunk.span;
                if chunk.id.sid != tss.sid || chunk_start >= del_end || chunk_end <= del_start {
                    i += 1;
                    continue;
                }

                let overlap_start = del_start.max(chunk_start);
                let overlap_end = del_end.min(chunk_end);

                if overlap_start > chunk_start {
                    let right = self.chunks[i].split_off(overlap_start - chunk_start);
                    self.chunks.insert(i + 1, right);
                    i += 1;
                }
                if overlap_end < self.chunks[i].id.time + self.chunks[i].span {
                    let keep = overlap_end - self.chunks[i].id.time;
                    let right = self.chunks[i].split_off(keep);
                    self.chunks.insert(i + 1, right);
                }
                self.chunks[i].data = None;
                i += 1;
            }
        }
    }

    /// Iterate live (non-deleted) chunks.
    pub fn iter_live(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| !c.is_deleted())
    }

    /// Iterate live slots as `(slot_id, node_id)` pairs, in order.
    pub fn slots(&self) -> impl Iterator<Item = (Ts, Ts)> + '_ {
        self.iter_live().flat_map(|chunk| {
            let first = chunk.id;
            chunk
                .data
                .iter()
                .flatten()
                .enumerate()
                .map(move |(i, node)| (Ts::new(first.sid, first.time + i as u64), *node))
        })
    }
}
