//! Send history: a bounded record of packets this peer has originated,
//! used to answer `VT_REQUEST` retransmission requests.
//!
//! Eviction policy is halve-when-full rather than a sliding window, to
//! avoid rewriting the whole buffer on every single eviction.

use super::packet::UnpackedPacket;
use super::vector::{MessageId, ProcessId};
use std::collections::VecDeque;

/// Ordered sequence of packets this peer originated, trimmed once it
/// exceeds `capacity` entries.
pub struct SendHistory {
    capacity: usize,
    entries: VecDeque<UnpackedPacket>,
}

impl SendHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    /// Append a packet this peer just originated, evicting the oldest half
    /// of the history if it has grown past capacity.
    pub fn push(&mut self, packet: UnpackedPacket) {
        self.entries.push_back(packet);
        if self.entries.len() > self.capacity {
            let keep_from = self.entries.len() / 2;
            self.entries.drain(0..keep_from);
        }
    }

    /// Find the packet we originated ourselves whose own-counter equals
    /// `missing_msg_id`.
    pub fn find(&self, originator: ProcessId, missing_msg_id: MessageId) -> Option<&UnpackedPacket> {
        self.entries
            .iter()
            .find(|p| p.vector.process_id == originator && p.vector.get(originator) == missing_msg_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::MessageType;
    use crate::core::vector::Vector;

    fn packet_at(process_id: ProcessId, count: MessageId) -> UnpackedPacket {
        let mut v = Vector::new("224.1.1.1".to_string());
        v.assign(process_id);
        v.set(process_id, count);
        UnpackedPacket {
            vector: v,
            message_type: MessageType::Temperature,
            payload: serde_json::json!(count),
        }
    }

    #[test]
    fn finds_packet_by_originator_and_sequence() {
        let mut history = SendHistory::new(10);
        history.push(packet_at(6001, 1));
        history.push(packet_at(6001, 2));

        let found = history.find(6001, 2).unwrap();
        assert_eq!(found.payload, serde_json::json!(2));
        assert!(history.find(6001, 3).is_none());
    }

    #[test]
    fn halves_when_over_capacity() {
        let mut history = SendHistory::new(4);
        for i in 1..=5 {
            history.push(packet_at(6001, i));
        }
        assert_eq!(history.len(), 3, "should have halved once capacity was exceeded");
        assert!(history.find(6001, 1).is_none(), "oldest half should be evicted");
        assert!(history.find(6001, 5).is_some());
    }
}
