//! JSON CRDT Patch protocol.
//!
//! The foundational layer for JSON CRDT collaboration. Defines:
//! - Clock types (`Ts`, `Tss`, `LogicalClock`, `ClockVector`)
//! - The CRDT operations (`Op` enum)
//! - `Patch`, an ordered sequence of operations
//! - `PatchBuilder`, a fluent builder for constructing patches
//! - The update `codec`

pub mod clock;
pub mod codec;
pub mod constants;
pub mod enums;
pub mod operations;
pub mod patch;
pub mod patch_builder;

// ── Re-exports ─────────────────────────────────────────────────────────────

pub use clock::{contains_id, print_ts, ts, tss};
pub use clock::{ClockVector, LogicalClock, Ts, Tss};
pub use codec::CodecError;
pub use constants::MAIN;
pub use enums::{random_sid, SESSION, SYSTEM_SESSION_TIME};
pub use operations::{ConValue, Op};
pub use patch::Patch;
pub use patch_builder::PatchBuilder;
