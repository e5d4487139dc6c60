//! Wire format: the JSON envelope every datagram carries, and the decoded
//! packet records handlers actually operate on.

use super::error::{CoreError, Result};
use super::vector::Vector;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Maximum size of a single UDP datagram this protocol will send or accept.
pub const MAX_PACKET_BYTES: usize = 1024;

/// The fixed set of message types the coordinator's dispatch table
/// recognizes. Serializes to uppercase, underscore-separated wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Discovery,
    DiscoveryResponse,
    Election,
    Vote,
    Coordinator,
    VtRequest,
    VtFound,
    VtNotFound,
    PhaseKingInit,
    PhaseKingFound,
    PhaseKingSend,
    PhaseKingDecision,
    Temperature,
    Undefined,
}

/// `{"VECTOR": ..., "TYPE": ..., "PAYLOAD": ...}`, encoded as UTF-8 JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "VECTOR")]
    pub vector: Vector,
    #[serde(rename = "TYPE")]
    pub message_type: MessageType,
    #[serde(rename = "PAYLOAD")]
    pub payload: serde_json::Value,
}

/// Encode a packet. Fails loudly (unlike decode failures, which are only
/// fatal to the packet) because an oversized or unserializable outbound
/// packet indicates a bug in the caller, not a hostile or lossy network.
pub fn pack(vector: &Vector, message_type: MessageType, payload: serde_json::Value) -> Result<Vec<u8>> {
    let packet = Packet {
        vector: vector.clone(),
        message_type,
        payload,
    };
    let bytes = serde_json::to_vec(&packet)?;
    if bytes.len() > MAX_PACKET_BYTES {
        return Err(CoreError::PacketTooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decode a packet. Decode failures are fatal to the packet only; callers
/// log and drop rather than propagate.
pub fn unpack(bytes: &[u8]) -> Result<Packet> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Bytes plus the sender's address, exactly as the transport layer hands
/// them to the coordinator, before any JSON decoding happens.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub bytes: Vec<u8>,
    pub sender: SocketAddr,
}

/// A `RawPacket` that has been successfully decoded. The sender's port
/// doubles as the originating process id for unicast replies.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub vector: Vector,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub sender: SocketAddr,
}

impl DecodedPacket {
    pub fn decode(raw: &RawPacket) -> Result<Self> {
        let packet = unpack(&raw.bytes)?;
        Ok(Self {
            vector: packet.vector,
            message_type: packet.message_type,
            payload: packet.payload,
            sender: raw.sender,
        })
    }
}

/// A packet this peer originated, as stored in `SendHistory` and as
/// returned verbatim by `VT_FOUND`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpackedPacket {
    pub vector: Vector,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vector::Vector;

    #[test]
    fn pack_unpack_roundtrip() {
        let mut v = Vector::new("224.1.1.1".to_string());
        v.assign(6003);
        v.set(6001, 3);

        let bytes = pack(&v, MessageType::Temperature, serde_json::json!(17)).unwrap();
        let packet = unpack(&bytes).unwrap();

        assert_eq!(packet.vector, v);
        assert_eq!(packet.message_type, MessageType::Temperature);
        assert_eq!(packet.payload, serde_json::json!(17));
    }

    #[test]
    fn message_type_tags_match_wire_strings() {
        assert_eq!(
            serde_json::to_string(&MessageType::DiscoveryResponse).unwrap(),
            "\"DISCOVERY_RESPONSE\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::VtNotFound).unwrap(),
            "\"VT_NOT_FOUND\""
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let v = Vector::new("224.1.1.1".to_string());
        let huge = serde_json::json!("x".repeat(MAX_PACKET_BYTES * 2));
        let err = pack(&v, MessageType::Temperature, huge).unwrap_err();
        assert!(matches!(err, CoreError::PacketTooLarge(_)));
    }

    #[test]
    fn decode_failure_is_fatal_to_packet_only() {
        let raw = RawPacket {
            bytes: b"not json".to_vec(),
            sender: "127.0.0.1:6001".parse().unwrap(),
        };
        assert!(DecodedPacket::decode(&raw).is_err());
    }
}
