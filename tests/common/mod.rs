//! Shared setup for black-box, multi-peer integration tests.
//!
//! Every test gets its own port block so concurrently-running `#[tokio::test]`
//! functions don't cross-talk over the same multicast group.

#![allow(dead_code)]

use destinator::core::config::Config;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

static NEXT_BASE: AtomicU16 = AtomicU16::new(31000);

/// Reserve `peers + 2` ports (one multicast port, one starting unicast port
/// per peer, plus headroom) and build a config isolated to that block.
pub fn test_config(peers: u16) -> Config {
    let base = NEXT_BASE.fetch_add(peers + 2, Ordering::Relaxed);

    let mut config = Config::default();
    config.group.multicast_port = base;
    config.group.starting_port = base + 1;

    // Short but nonzero, so election/phase-king rounds actually converge
    // within a test's patience instead of waiting out real
    // (multi-second-to-minute) production intervals.
    config.discovery.interval_secs = 1;
    config.bully.call_timeout_secs = 1;
    config.bully.response_timeout_secs = 1;
    config.bully.coordinator_timeout_secs = 1;
    config.phase_king.init_schedule_secs = 1;
    config.phase_king.start_timeout_secs = 1;
    config.phase_king.min_participants = peers as usize;

    config
}

pub async fn settle(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
