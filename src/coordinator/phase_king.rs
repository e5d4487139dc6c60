//! Phase-King Byzantine agreement, `f = 1`, `n >= 5`.
//!
//! The leader drives rounds with a periodic INIT job; every peer closes
//! participant discovery on its own one-shot START job; decisions
//! propagate king by king until majorities outnumber a quarter of the
//! participants.

use super::{Coordinator, PHASE_KING_INIT_JOB, PHASE_KING_START_JOB};
use crate::core::packet::{DecodedPacket, MessageType};
use crate::core::vector::ProcessId;

const BYZANTINE_VALUE: i64 = 66;
const HONEST_VALUE: i64 = 42;

pub struct PhaseKingState {
    pub(crate) participants: Vec<ProcessId>,
    pub(crate) received: Vec<i64>,
    pub(crate) majorities: Vec<i64>,
}

impl PhaseKingState {
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            received: Vec::new(),
            majorities: Vec::new(),
        }
    }
}

/// Most-frequent element, ties broken by first encountered.
fn majority(values: &[i64]) -> i64 {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(val, _)| *val == v) {
            Some(entry) => entry.1 += 1,
            None => counts.push((v, 1)),
        }
    }

    let mut best: Option<(i64, usize)> = None;
    for (value, count) in counts {
        let replace = match best {
            Some((_, best_count)) => count > best_count,
            None => true,
        };
        if replace {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value).unwrap_or(0)
}

impl Coordinator {
    fn own_phase_king_value(&self) -> i64 {
        if self.is_leader {
            BYZANTINE_VALUE
        } else {
            HONEST_VALUE
        }
    }

    /// Called once a peer becomes operational; only the leader's INIT job
    /// actually drives rounds, followers wait for PHASE_KING_INIT.
    pub(crate) fn phase_king_start(&mut self) {
        if self.is_leader {
            self.scheduler.resume(PHASE_KING_INIT_JOB, self.config.init_schedule());
        }
    }

    pub(crate) async fn init_new_round(&mut self) {
        if !self.is_leader {
            return;
        }
        self.scheduler.pause(PHASE_KING_INIT_JOB);

        let own = self.own_phase_king_value();
        self.phase_king.participants = vec![self.vector.process_id];
        self.phase_king.received = vec![own];
        self.phase_king.majorities = vec![own];

        self.send(MessageType::PhaseKingInit, serde_json::Value::Null, None, false)
            .await;
        self.scheduler.resume(PHASE_KING_START_JOB, self.config.start_timeout());
    }

    pub(crate) async fn handle_phase_king_init(&mut self, decoded: DecodedPacket) {
        if self.is_leader {
            return;
        }
        let leader_id = decoded.vector.process_id;
        let own = self.own_phase_king_value();

        self.phase_king.participants = vec![leader_id];
        self.phase_king.received = vec![own];
        self.phase_king.majorities = vec![own];

        self.send(MessageType::PhaseKingFound, serde_json::json!(own), None, false)
            .await;
        self.scheduler.resume(PHASE_KING_START_JOB, self.config.start_timeout());
    }

    pub(crate) async fn handle_phase_king_found(&mut self, decoded: DecodedPacket) {
        let sender_id = decoded.vector.process_id;
        let value = match decoded.payload.as_i64() {
            Some(v) => v,
            None => return,
        };

        if !self.phase_king.participants.contains(&sender_id) {
            self.phase_king.participants.push(sender_id);
            self.phase_king.participants.sort();
        }
        self.phase_king.received.push(value);
    }

    /// Closes participant discovery; only `participants[0]` kicks off
    /// round 0.
    pub(crate) async fn start_first_round(&mut self) {
        self.scheduler.pause(PHASE_KING_START_JOB);

        if self.phase_king.participants.len() < self.config.phase_king.min_participants {
            tracing::debug!(
                got = self.phase_king.participants.len(),
                needed = self.config.phase_king.min_participants,
                "aborting phase-king run, too few participants"
            );
            if self.is_leader {
                self.scheduler.resume(PHASE_KING_INIT_JOB, self.config.init_schedule());
            }
            return;
        }

        if self.phase_king.participants.first() != Some(&self.vector.process_id) {
            return;
        }

        let decision = majority(&self.phase_king.received);
        let payload = serde_json::json!({ "ROUND": 0, "VALUE": decision });
        self.send(MessageType::PhaseKingDecision, payload, None, false).await;
        self.advance_round(0, decision).await;
    }

    /// Record a round's decided majority and either declare convergence or
    /// forward this peer's own value to the next round's king. Driven both
    /// by a king deciding its own round (it isn't echoed its own broadcast)
    /// and by every other peer on receipt of `PHASE_KING_DECISION`.
    async fn advance_round(&mut self, round: u32, decision: i64) {
        if round == 0 {
            self.phase_king.received = vec![self.own_phase_king_value()];
        }
        self.phase_king.majorities.push(decision);

        let participants = self.phase_king.participants.len();
        if self.phase_king.majorities.len() > participants / 4 + 1 {
            let decided = majority(&self.phase_king.majorities);
            tracing::info!(decided, "phase-king run converged");
            if self.is_leader {
                self.scheduler.resume(PHASE_KING_INIT_JOB, self.config.init_schedule());
            }
            return;
        }

        let next_round = round + 1;
        if let Some(&target) = self.phase_king.participants.get(next_round as usize) {
            let payload = serde_json::json!({ "ROUND": next_round, "VALUE": self.own_phase_king_value() });
            self.send(MessageType::PhaseKingSend, payload, Some(target), false).await;
        }
    }

    pub(crate) async fn handle_phase_king_decision(&mut self, decoded: DecodedPacket) {
        let round = decoded.payload.get("ROUND").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let majority_value = match decoded.payload.get("VALUE").and_then(|v| v.as_i64()) {
            Some(v) => v,
            None => return,
        };

        self.advance_round(round, majority_value).await;
    }

    pub(crate) async fn handle_phase_king_send(&mut self, decoded: DecodedPacket) {
        let round = decoded.payload.get("ROUND").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let value = match decoded.payload.get("VALUE").and_then(|v| v.as_i64()) {
            Some(v) => v,
            None => return,
        };

        self.phase_king.received.push(value);

        if round == 0 {
            let sender_id = decoded.vector.process_id;
            if !self.phase_king.participants.contains(&sender_id) {
                self.phase_king.participants.push(sender_id);
                self.phase_king.participants.sort();
            }
        }

        let is_king = self.phase_king.participants.get(round as usize) == Some(&self.vector.process_id);
        if is_king && self.phase_king.received.len() == self.phase_king.participants.len() {
            let decision = majority(&self.phase_king.received);
            let payload = serde_json::json!({ "ROUND": round, "VALUE": decision });
            self.send(MessageType::PhaseKingDecision, payload, None, false).await;
            self.advance_round(round, decision).await;
        }
    }
}


#[cfg(test)]
mod coordinator_tests {
    use super::super::test_support;
    use crate::core::packet::{DecodedPacket, MessageType};
    use crate::core::vector::Vector;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU16, Ordering};

    static TEST_PORT: AtomicU16 = AtomicU16::new(26000);

    fn next_port() -> u16 {
        TEST_PORT.fetch_add(2, Ordering::Relaxed)
    }

    fn found_from(sender_id: i64, value: i64) -> DecodedPacket {
        let mut vector = Vector::new("224.1.1.1".to_string());
        vector.assign(sender_id);
        DecodedPacket {
            vector,
            message_type: MessageType::PhaseKingFound,
            payload: serde_json::json!(value),
            sender: "127.0.0.1:9".parse::<SocketAddr>().unwrap(),
        }
    }

    #[tokio::test]
    async fn phase_king_found_accumulates_participants_and_values() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, true, Some(port as i64 + 1)).await;

        coordinator.handle_phase_king_found(found_from(port as i64 + 2, 42)).await;

        assert_eq!(coordinator.phase_king.participants, vec![port as i64 + 2]);
        assert_eq!(coordinator.phase_king.received, vec![42]);
    }

    #[tokio::test]
    async fn first_round_aborts_when_too_few_participants_joined() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, true, Some(port as i64 + 1)).await;
        coordinator.phase_king.participants = vec![port as i64 + 1];
        coordinator.phase_king.received = vec![66];

        coordinator.start_first_round().await;

        assert!(coordinator.phase_king.majorities.is_empty());
    }
}
