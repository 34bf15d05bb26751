//! Session metrics.
//!
//! Counters are recorded through the `metrics` facade; they go nowhere
//! unless the application installs a recorder. A [`Telemetry`] built with
//! `enabled = false` records nothing at all.

use metrics::{counter, describe_counter};

pub const SESSIONS_STARTED: &str = "relay.sessions.started";
pub const SESSIONS_READY: &str = "relay.sessions.ready";
pub const SESSIONS_FAULTED: &str = "relay.sessions.faulted";
pub const UPDATES_SENT: &str = "relay.updates.sent";
pub const UPDATES_RECEIVED: &str = "relay.updates.received";
pub const FRAMES_SKIPPED: &str = "relay.frames.skipped";

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!(SESSIONS_STARTED, "Number of replication sessions started");
    describe_counter!(SESSIONS_READY, "Number of sessions that completed reconciliation");
    describe_counter!(SESSIONS_FAULTED, "Number of sessions that ended in a fault");
    describe_counter!(UPDATES_SENT, "Number of local updates sent to the relay");
    describe_counter!(UPDATES_RECEIVED, "Number of remote updates applied");
    describe_counter!(FRAMES_SKIPPED, "Number of malformed inbound frames skipped");
}

#[derive(Debug, Clone, Copy)]
pub struct Telemetry {
    enabled: bool,
}

impl Telemetry {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn record(&self, name: &'static str, value: u64) {
        if self.enabled {
            counter!(name).increment(value);
        }
    }
}
