//! Reserved identifiers of the JSON CRDT patch protocol.

/// Reserved session IDs.
#[allow(non_snake_case)]
pub mod SESSION {
    /// Reserved by the protocol, cannot be used by peers.
    pub const SYSTEM: u64 = 0;
    /// Smallest session ID handed out to a peer.
    pub const MIN_PEER: u64 = 65536;
    /// Maximum allowed session ID (53-bit safe integer).
    pub const MAX: u64 = 9007199254740991;
}

/// Reserved system-session time values.
#[allow(non_snake_case)]
pub mod SYSTEM_SESSION_TIME {
    pub const ORIGIN: u64 = 0;
    pub const UNDEFINED: u64 = 1;
    /// The `"main"` root container every document starts with.
    pub const MAIN: u64 = 2;
    /// First time a peer clock may issue.
    pub const FIRST_PEER_TIME: u64 = 3;
}

/// Draws a random peer session ID in `[SESSION::MIN_PEER, SESSION::MAX]`.
pub fn random_sid() -> u64 {
    use rand::Rng;
    rand::thread_rng().gen_range(SESSION::MIN_PEER..=SESSION::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_sid_stays_in_peer_range() {
        for _ in 0..64 {
            let sid = random_sid();
            assert!(sid >= SESSION::MIN_PEER);
            assert!(sid <= SESSION::MAX);
        }
    }
}
