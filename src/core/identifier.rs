//! Durable per-peer identifiers.
//!
//! Combines the host MAC address with a distinguishing tag so the leader
//! can recognize a peer re-sending DISCOVERY after a socket blip. A
//! single-process test harness runs many peers on one host (one MAC, no
//! distinct OS threads per async task), so this crate uses a process-wide
//! monotonic peer-instance counter as that tag instead of a thread id.

use std::sync::atomic::{AtomicU64, Ordering};

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `"<mac_hex>-<instance>"`, unique per peer instance within this process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentifier(String);

impl PeerIdentifier {
    /// Allocate a new identifier: the host MAC plus the next instance tag.
    pub fn generate() -> Self {
        let mac = mac_address::get_mac_address()
            .ok()
            .flatten()
            .map(|m| m.to_string().replace(':', ""))
            .unwrap_or_else(|| "000000000000".to_string());
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{mac}-{instance}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_instances_get_distinct_identifiers() {
        let a = PeerIdentifier::generate();
        let b = PeerIdentifier::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn identifier_contains_a_dash_separated_instance_tag() {
        let id = PeerIdentifier::generate();
        assert!(id.as_str().contains('-'));
    }
}
