use super::*;
use serde_json::json;

// =============================================================
// encode
// =============================================================

#[test]
fn connect_to_default_namespace_is_bare_type() {
    assert_eq!(SocketPacket::connect("/").encode().expect("encode"), "0");
}

#[test]
fn connect_to_custom_namespace_adds_prefix() {
    assert_eq!(SocketPacket::connect("/diagnosis").encode().expect("encode"), "0/diagnosis,");
}

#[test]
fn send_message_event_encodes_name_then_payload() {
    let packet = SocketPacket::event("/", "send_message", json!({ "message": "Hello from client!" }));
    assert_eq!(packet.encode().expect("encode"), r#"2["send_message",{"message":"Hello from client!"}]"#);
}

#[test]
fn event_with_ack_id_places_id_before_payload() {
    let mut packet = SocketPacket::event("/admin", "ping", json!(1));
    packet.ack_id = Some(12);
    assert_eq!(packet.encode().expect("encode"), r#"2/admin,12["ping",1]"#);
}

// =============================================================
// decode
// =============================================================

#[test]
fn decode_connect_ack_carries_sid() {
    let packet = SocketPacket::decode(r#"0{"sid":"xyz"}"#).expect("decode");
    assert_eq!(packet.kind, PacketKind::Connect);
    assert_eq!(packet.namespace, "/");
    assert_eq!(packet.data, Some(json!({ "sid": "xyz" })));
}

#[test]
fn decode_response_event_exposes_name_and_args() {
    let packet = SocketPacket::decode(r#"2["response",{"data":"ok"}]"#).expect("decode");
    assert_eq!(packet.event_name(), Some("response"));
    assert_eq!(packet.event_args(), &[json!({ "data": "ok" })]);
}

#[test]
fn decode_namespace_and_ack_id() {
    let packet = SocketPacket::decode(r#"3/admin,7["done"]"#).expect("decode");
    assert_eq!(packet.kind, PacketKind::Ack);
    assert_eq!(packet.namespace, "/admin");
    assert_eq!(packet.ack_id, Some(7));
    assert_eq!(packet.event_name(), None);
}

#[test]
fn decode_namespace_without_payload() {
    let packet = SocketPacket::decode("1/admin").expect("decode");
    assert_eq!(packet.kind, PacketKind::Disconnect);
    assert_eq!(packet.namespace, "/admin");
    assert!(packet.data.is_none());
}

#[test]
fn connect_error_message_reads_object_or_string() {
    let packet = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).expect("decode");
    assert_eq!(packet.connect_error_message().as_deref(), Some("Not authorized"));

    let packet = SocketPacket::decode(r#"4"bad origin""#).expect("decode");
    assert_eq!(packet.connect_error_message().as_deref(), Some("bad origin"));
}

#[test]
fn decode_rejects_binary_packets() {
    assert!(matches!(
        SocketPacket::decode(r#"51-["upload",{"_placeholder":true,"num":0}]"#),
        Err(CodecError::UnsupportedBinary)
    ));
}

#[test]
fn decode_rejects_overflowing_ack_id() {
    let err = SocketPacket::decode("399999999999999999999999[]").expect_err("overflow");
    assert!(matches!(err, CodecError::InvalidAckId(_)));
}

#[test]
fn event_args_empty_for_non_events() {
    let packet = SocketPacket::connect("/");
    assert!(packet.event_args().is_empty());
}
