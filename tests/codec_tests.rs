//! Integration-level exercise of the wire codec: the exact JSON envelope
//! peers exchange over the multicast transport.

use destinator::core::packet::{pack, unpack, MessageType, MAX_PACKET_BYTES};
use destinator::core::vector::Vector;

fn sample_vector() -> Vector {
    let mut v = Vector::new("224.1.1.1".to_string());
    v.assign(6003);
    v.set(6001, 3);
    v
}

#[test]
fn envelope_uses_the_upper_case_wire_keys() {
    let bytes = pack(&sample_vector(), MessageType::Temperature, serde_json::json!(21)).unwrap();
    let text = String::from_utf8(bytes).unwrap();

    assert!(text.contains("\"VECTOR\""));
    assert!(text.contains("\"TYPE\""));
    assert!(text.contains("\"PAYLOAD\""));
    assert!(text.contains("\"TEMPERATURE\""));
}

#[test]
fn vector_index_keys_round_trip_as_integers_despite_json_string_keys() {
    let bytes = pack(&sample_vector(), MessageType::Temperature, serde_json::json!(21)).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.contains("\"6001\":3") || text.contains("\"6001\": 3"));

    let packet = unpack(&bytes).unwrap();
    assert_eq!(packet.vector.get(6001), 3);
    assert_eq!(packet.vector.process_id, 6003);
}

#[test]
fn every_message_type_serializes_to_its_screaming_snake_case_tag() {
    let cases = [
        (MessageType::Discovery, "\"DISCOVERY\""),
        (MessageType::DiscoveryResponse, "\"DISCOVERY_RESPONSE\""),
        (MessageType::Election, "\"ELECTION\""),
        (MessageType::Vote, "\"VOTE\""),
        (MessageType::Coordinator, "\"COORDINATOR\""),
        (MessageType::VtRequest, "\"VT_REQUEST\""),
        (MessageType::VtFound, "\"VT_FOUND\""),
        (MessageType::VtNotFound, "\"VT_NOT_FOUND\""),
        (MessageType::PhaseKingInit, "\"PHASE_KING_INIT\""),
        (MessageType::PhaseKingFound, "\"PHASE_KING_FOUND\""),
        (MessageType::PhaseKingSend, "\"PHASE_KING_SEND\""),
        (MessageType::PhaseKingDecision, "\"PHASE_KING_DECISION\""),
        (MessageType::Temperature, "\"TEMPERATURE\""),
        (MessageType::Undefined, "\"UNDEFINED\""),
    ];
    for (mt, tag) in cases {
        assert_eq!(serde_json::to_string(&mt).unwrap(), tag);
    }
}

#[test]
fn a_packet_over_the_wire_cap_is_rejected_at_encode_time() {
    let huge_payload = serde_json::json!("x".repeat(MAX_PACKET_BYTES * 2));
    let result = pack(&sample_vector(), MessageType::Temperature, huge_payload);
    assert!(result.is_err());
}

#[test]
fn garbage_bytes_fail_to_decode_without_panicking() {
    assert!(unpack(b"not a json packet").is_err());
}
