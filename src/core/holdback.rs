//! Hold-back queue: packets received but not yet causally deliverable.

use super::packet::DecodedPacket;

/// Unordered set of packets whose vectors are not yet causally
/// deliverable.
#[derive(Default)]
pub struct HoldBack {
    packets: Vec<DecodedPacket>,
}

impl HoldBack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: DecodedPacket) {
        self.packets.push(packet);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecodedPacket> {
        self.packets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Remove and return every packet for which `predicate` holds, in
    /// discovery order, leaving the rest in place.
    pub fn extract<F>(&mut self, mut predicate: F) -> Vec<DecodedPacket>
    where
        F: FnMut(&DecodedPacket) -> bool,
    {
        let mut extracted = Vec::new();
        let mut remaining = Vec::with_capacity(self.packets.len());
        for packet in self.packets.drain(..) {
            if predicate(&packet) {
                extracted.push(packet);
            } else {
                remaining.push(packet);
            }
        }
        self.packets = remaining;
        extracted
    }
}
