//! Bully leader election.
//!
//! Three scheduled jobs (CALL, CALL_RESPONSE, COORDINATOR) drive the state
//! machine, all paused until a peer's first operational transition.

use super::{Coordinator, BULLY_CALL_JOB, BULLY_COORDINATOR_JOB, BULLY_RESPONSE_JOB};
use crate::core::packet::{DecodedPacket, MessageType};
use crate::core::vector::UNASSIGNED;

pub struct BullyState {
    pub(crate) election_was_answered: bool,
}

impl BullyState {
    pub fn new() -> Self {
        Self {
            election_was_answered: false,
        }
    }
}

impl Coordinator {
    pub(crate) async fn call_for_election(&mut self) {
        if self.vector.process_id <= 0 || self.is_leader {
            return;
        }

        self.scheduler.pause(BULLY_CALL_JOB);
        self.scheduler.pause(BULLY_RESPONSE_JOB);
        self.bully.election_was_answered = false;

        let own_id = self.vector.process_id;
        let higher: Vec<_> = self
            .vector
            .keys()
            .filter(|&k| k != UNASSIGNED && k > own_id)
            .collect();

        for peer in higher {
            self.send(MessageType::Election, serde_json::json!(own_id), Some(peer), false)
                .await;
        }

        self.scheduler.resume(BULLY_RESPONSE_JOB, self.config.response_timeout());
    }

    pub(crate) async fn handle_election(&mut self, decoded: DecodedPacket) {
        let sender_id = decoded.vector.process_id;
        if sender_id < self.vector.process_id {
            self.send(
                MessageType::Vote,
                serde_json::json!(self.vector.process_id),
                Some(sender_id),
                false,
            )
            .await;
        }
    }

    pub(crate) async fn handle_vote(&mut self, decoded: DecodedPacket) {
        let sender_id = decoded.vector.process_id;
        if sender_id < self.vector.process_id {
            self.call_for_election().await;
        } else {
            self.bully.election_was_answered = true;
            self.scheduler.resume(BULLY_COORDINATOR_JOB, self.config.coordinator_timeout());
        }
    }

    pub(crate) async fn on_call_response_timeout(&mut self) {
        self.scheduler.pause(BULLY_RESPONSE_JOB);
        if self.bully.election_was_answered {
            return;
        }
        self.is_leader = true;
        self.send(MessageType::Coordinator, serde_json::Value::Null, None, false)
            .await;
    }

    pub(crate) async fn handle_coordinator(&mut self, decoded: DecodedPacket) {
        let sender_id = decoded.vector.process_id;
        self.is_leader = self.vector.process_id == sender_id;
        self.scheduler.pause(BULLY_RESPONSE_JOB);
        self.scheduler.pause(BULLY_COORDINATOR_JOB);

        if sender_id < self.vector.process_id {
            self.call_for_election().await;
        } else {
            self.scheduler.resume(BULLY_CALL_JOB, self.config.call_timeout());
        }
    }

    pub(crate) async fn on_coordinator_timeout(&mut self) {
        self.scheduler.pause(BULLY_COORDINATOR_JOB);
        self.call_for_election().await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use crate::core::packet::{DecodedPacket, MessageType};
    use crate::core::vector::Vector;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU16, Ordering};

    static TEST_PORT: AtomicU16 = AtomicU16::new(23000);

    fn next_port() -> u16 {
        TEST_PORT.fetch_add(2, Ordering::Relaxed)
    }

    fn sender_addr() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn vote_from(sender_id: i64) -> DecodedPacket {
        let mut vector = Vector::new("224.1.1.1".to_string());
        vector.assign(sender_id);
        DecodedPacket {
            vector,
            message_type: MessageType::Vote,
            payload: serde_json::Value::Null,
            sender: sender_addr(),
        }
    }

    fn coordinator_from(sender_id: i64) -> DecodedPacket {
        let mut vector = Vector::new("224.1.1.1".to_string());
        vector.assign(sender_id);
        DecodedPacket {
            vector,
            message_type: MessageType::Coordinator,
            payload: serde_json::Value::Null,
            sender: sender_addr(),
        }
    }

    #[tokio::test]
    async fn vote_from_higher_id_marks_election_answered() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, false, Some(100)).await;

        coordinator.handle_vote(vote_from(200)).await;

        assert!(coordinator.bully.election_was_answered);
        assert!(!coordinator.is_leader());
    }

    #[tokio::test]
    async fn vote_from_lower_id_calls_another_election() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, false, Some(100)).await;
        coordinator.bully.election_was_answered = true;

        coordinator.handle_vote(vote_from(50)).await;

        // call_for_election resets the flag before sending fresh ELECTION
        // messages out, regardless of what the stale vote had set.
        assert!(!coordinator.bully.election_was_answered);
    }

    #[tokio::test]
    async fn call_response_timeout_with_no_vote_declares_self_leader() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, false, Some(100)).await;

        coordinator.on_call_response_timeout().await;

        assert!(coordinator.is_leader());
    }

    #[tokio::test]
    async fn call_response_timeout_after_a_vote_does_not_self_promote() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, false, Some(100)).await;
        coordinator.bully.election_was_answered = true;

        coordinator.on_call_response_timeout().await;

        assert!(!coordinator.is_leader());
    }

    #[tokio::test]
    async fn coordinator_announcement_from_self_confirms_leadership() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, false, Some(100)).await;

        coordinator.handle_coordinator(coordinator_from(100)).await;

        assert!(coordinator.is_leader());
    }

    #[tokio::test]
    async fn coordinator_announcement_from_another_process_defers_leadership() {
        let port = next_port();
        let (mut coordinator, _timer_rx, _deliver_rx) =
            test_support::coordinator(port, false, Some(100)).await;
        coordinator.is_leader = true;

        coordinator.handle_coordinator(coordinator_from(50)).await;

        assert!(!coordinator.is_leader());
    }
}
