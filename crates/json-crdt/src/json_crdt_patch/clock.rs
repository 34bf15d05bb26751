//! Logical clock types for the JSON CRDT patch protocol.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::json_crdt_patch::enums::SESSION;

// ── Core structs ───────────────────────────────────────────────────────────

/// An immutable logical timestamp: `(session_id, logical_time)`.
///
/// Every CRDT node and every operation is identified by one. Timestamps are
/// totally ordered by time first, then by session id, which is what the
/// last-writer-wins rules of the document compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ts {
    pub sid: u64,
    pub time: u64,
}

impl Ts {
    pub const fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }
}

impl Ord for Ts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.sid.cmp(&other.sid))
    }
}

impl PartialOrd for Ts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_ts(*self))
    }
}

/// An immutable logical time-span: `(session_id, logical_time, span)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tss {
    pub sid: u64,
    pub time: u64,
    pub span: u64,
}

impl Tss {
    pub const fn new(sid: u64, time: u64, span: u64) -> Self {
        Self { sid, time, span }
    }

    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }
}

// ── Factory functions ──────────────────────────────────────────────────────

/// Create a timestamp.
#[inline]
pub fn ts(sid: u64, time: u64) -> Ts {
    Ts::new(sid, time)
}

/// Create a timespan.
#[inline]
pub fn tss(sid: u64, time: u64, span: u64) -> Tss {
    Tss::new(sid, time, span)
}

/// Returns `true` if the timespan `[ts1, span1)` contains point `ts2`.
pub fn contains_id(ts1: Ts, span1: u64, ts2: Ts) -> bool {
    ts1.sid == ts2.sid && ts1.time <= ts2.time && ts2.time < ts1.time + span1
}

/// Human-readable representation of a timestamp.
pub fn print_ts(id: Ts) -> String {
    if id.sid == SESSION::SYSTEM {
        return format!(".{}", id.time);
    }
    let s = id.sid.to_string();
    let session = if s.len() > 4 {
        format!("..{}", &s[s.len() - 4..])
    } else {
        s
    };
    format!("{}.{}", session, id.time)
}

// ── LogicalClock ───────────────────────────────────────────────────────────

/// A mutable logical clock that can be ticked.
#[derive(Debug, Clone)]
pub struct LogicalClock {
    pub sid: u64,
    pub time: u64,
}

impl LogicalClock {
    pub fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }

    /// Returns the current timestamp and advances the clock by `cycles`.
    pub fn tick(&mut self, cycles: u64) -> Ts {
        let stamp = Ts::new(self.sid, self.time);
        self.time += cycles;
        stamp
    }
}

// ── ClockVector ────────────────────────────────────────────────────────────

/// A vector clock: local logical clock plus the last time seen from each peer.
#[derive(Debug, Clone)]
pub struct ClockVector {
    pub sid: u64,
    pub time: u64,
    pub peers: HashMap<u64, Ts>,
}

impl ClockVector {
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            sid,
            time,
            peers: HashMap::new(),
        }
    }

    /// Advance local time whenever we observe a timestamp with a higher value.
    /// Idempotent: calling multiple times is safe.
    pub fn observe(&mut self, id: Ts, span: u64) {
        if span == 0 {
            return;
        }
        let edge = id.time + span - 1;
        let sid = id.sid;
        if sid != self.sid {
            self.peers
                .entry(sid)
                .and_modify(|e| {
                    if edge > e.time {
                        e.time = edge;
                    }
                })
                .or_insert_with(|| Ts::new(sid, edge));
        }
        if edge >= self.time {
            self.time = edge + 1;
        }
    }
}
