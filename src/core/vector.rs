//! Vector clock shared by every handler.
//!
//! A `Vector` is the unit of causal information attached to every packet on
//! the wire: the group it belongs to, the process that produced it, and
//! this peer's view of how many messages each known process has
//! originated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A peer's identity on the wire before it has been assigned a unicast
/// port by the leader.
pub const UNASSIGNED: ProcessId = -1;

/// Process identifiers double as the peer's unicast port once assigned,
/// so they need the range of a port plus the `-1` sentinel.
pub type ProcessId = i64;

/// Number of messages a process has originated, from the local peer's
/// point of view.
pub type MessageId = u64;

/// `group_id` + `process_id` + per-process send counters.
///
/// Serializes as `{"group_id": "...", "process_id": N, "index": {"6001": 3}}`;
/// `BTreeMap<ProcessId, MessageId>` round-trips through `serde_json` with
/// integer keys coerced to JSON strings on the wire and back to integers on
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub group_id: String,
    pub process_id: ProcessId,
    pub index: BTreeMap<ProcessId, MessageId>,
}

impl Vector {
    /// A fresh vector for a peer that has not yet been assigned a process id.
    pub fn new(group_id: String) -> Self {
        let mut index = BTreeMap::new();
        index.insert(UNASSIGNED, 0);
        Self {
            group_id,
            process_id: UNASSIGNED,
            index,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.process_id != UNASSIGNED
    }

    /// Complete discovery: drop the sentinel key, adopt the assigned port
    /// as our own process id, and start our own counter at zero.
    pub fn assign(&mut self, process_id: ProcessId) {
        self.index.remove(&UNASSIGNED);
        self.process_id = process_id;
        self.index.entry(process_id).or_insert(0);
    }

    /// Current count for `process_id`, or `0` if never observed.
    pub fn get(&self, process_id: ProcessId) -> MessageId {
        self.index.get(&process_id).copied().unwrap_or(0)
    }

    /// Our own send counter.
    pub fn own_count(&self) -> MessageId {
        self.get(self.process_id)
    }

    /// Pre-increment our own counter; used only when originating a new
    /// application-level message, so that `index[self]` equals the
    /// sequence number of the message about to be sent.
    pub fn increment_own(&mut self) -> MessageId {
        let pid = self.process_id;
        self.increment(pid)
    }

    /// Increment the counter for any known process, used when a held-back
    /// packet is delivered and this peer's view of its originator advances.
    pub fn increment(&mut self, process_id: ProcessId) -> MessageId {
        let entry = self.index.entry(process_id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Merge another vector's index into ours, keeping the higher of the
    /// two counts for every key. This is the "merge that preserves local
    /// higher counts" policy: a blind `index.update` would let a stale
    /// DISCOVERY_RESPONSE regress our own send counter.
    pub fn merge_max(&mut self, other: &BTreeMap<ProcessId, MessageId>) {
        for (&k, &v) in other {
            let entry = self.index.entry(k).or_insert(0);
            if v > *entry {
                *entry = v;
            }
        }
    }

    /// Set `index[process_id]` directly, without the merge-max comparison.
    /// Used by the leader when it assigns a brand-new process id, which
    /// always starts at zero regardless of the leader's own counter.
    pub fn set(&mut self, process_id: ProcessId, value: MessageId) {
        self.index.insert(process_id, value);
    }

    pub fn contains(&self, process_id: ProcessId) -> bool {
        self.index.contains_key(&process_id)
    }

    pub fn keys(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.index.keys().copied()
    }
}
