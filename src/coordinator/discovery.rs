//! Discovery: resolves a newly-started peer's process id via the leader.
//!
//! Every peer can both broadcast DISCOVERY with its identifier and, if
//! it's the leader, assign ports and reply — the same handler plays both
//! roles depending on `is_leader`.

use super::{Coordinator, Mode, BULLY_CALL_JOB, DISCOVERY_JOB};
use crate::core::packet::{DecodedPacket, MessageType};
use crate::core::vector::{ProcessId, UNASSIGNED};
use std::collections::HashMap;

/// Leader-side bookkeeping: remembers which identifier already holds which
/// port, so a peer re-sending DISCOVERY after a socket blip gets the same
/// port back.
pub struct DiscoveryState {
    pub(crate) ports_identifier: HashMap<String, ProcessId>,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self {
            ports_identifier: HashMap::new(),
        }
    }
}

impl Coordinator {
    pub(crate) fn start_discovery(&mut self) {
        self.scheduler.resume(DISCOVERY_JOB, self.config.discovery_interval());
    }

    pub(crate) async fn on_discovery_tick(&mut self) {
        if self.vector.is_assigned() {
            self.scheduler.pause(DISCOVERY_JOB);
            return;
        }
        let payload = serde_json::json!({ "IDENTIFY": self.identifier.as_str() });
        self.send(MessageType::Discovery, payload, None, false).await;
    }

    /// Leader side: assign (or reuse) a port for the requesting identifier
    /// and multicast a DISCOVERY_RESPONSE.
    pub(crate) async fn handle_discovery(&mut self, decoded: DecodedPacket) {
        let identifier = match decoded.payload.get("IDENTIFY").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!("DISCOVERY packet missing IDENTIFY field");
                return;
            }
        };

        let assigned_port = if let Some(&port) = self.discovery.ports_identifier.get(&identifier) {
            port
        } else {
            let next = self
                .vector
                .keys()
                .filter(|&k| k != UNASSIGNED)
                .max()
                .map(|max| max + 1)
                .unwrap_or(self.config.group.starting_port as ProcessId);
            self.discovery.ports_identifier.insert(identifier.clone(), next);
            // New peers always start at zero, never inheriting the leader's
            // own counter.
            self.vector.set(next, 0);
            next
        };

        let payload = serde_json::json!({
            "IDENTIFY": identifier,
            "PROCESS": assigned_port,
        });
        self.send(MessageType::DiscoveryResponse, payload, None, false).await;
    }

    /// Every peer records the identifier→port binding and merges the
    /// leader's index; only the peer the response is actually addressed to
    /// completes discovery.
    pub(crate) async fn handle_discovery_response(&mut self, decoded: DecodedPacket) {
        let identifier = match decoded.payload.get("IDENTIFY").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => return,
        };
        let assigned_port = match decoded.payload.get("PROCESS").and_then(|v| v.as_i64()) {
            Some(port) => port,
            None => return,
        };

        self.discovery.ports_identifier.insert(identifier.clone(), assigned_port);
        self.vector.merge_max(&decoded.vector.index);

        if self.mode != Mode::Discovering || identifier != self.identifier.as_str() {
            return;
        }

        self.vector.assign(assigned_port);
        self.mode = Mode::Operational;
        self.scheduler.pause(DISCOVERY_JOB);

        match self.transport.bind_unicast(assigned_port as u16).await {
            Ok(()) => {
                let _ = self.transport.spawn_unicast_reader(self.raw_tx.clone()).await;
            }
            Err(e) => {
                tracing::error!(error = ?e, assigned_port, "failed to bind unicast socket after discovery");
            }
        }

        if !self.is_leader {
            self.scheduler.resume(BULLY_CALL_JOB, self.config.call_timeout());
        }
        self.phase_king_start();
    }
}
