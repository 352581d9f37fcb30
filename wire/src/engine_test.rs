use super::*;

// =============================================================
// decode
// =============================================================

#[test]
fn decode_open_parses_handshake() {
    let packet = EnginePacket::decode(
        r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
    )
    .expect("open packet");

    let EnginePacket::Open(handshake) = packet else {
        panic!("expected open packet");
    };
    assert_eq!(handshake.sid, "abc");
    assert_eq!(handshake.ping_interval, 25_000);
    assert_eq!(handshake.liveness_window_ms(), 45_000);
}

#[test]
fn decode_open_defaults_missing_max_payload() {
    let packet = EnginePacket::decode(r#"0{"sid":"s","pingInterval":1,"pingTimeout":2}"#).expect("open packet");
    let EnginePacket::Open(handshake) = packet else {
        panic!("expected open packet");
    };
    assert_eq!(handshake.max_payload, 1_000_000);
    assert!(handshake.upgrades.is_empty());
}

#[test]
fn decode_ping_with_and_without_probe() {
    assert_eq!(EnginePacket::decode("2").expect("ping"), EnginePacket::Ping(None));
    assert_eq!(EnginePacket::decode("2probe").expect("ping"), EnginePacket::Ping(Some("probe".to_owned())));
}

#[test]
fn decode_message_keeps_socket_body_verbatim() {
    let packet = EnginePacket::decode(r#"42["response",{"ok":true}]"#).expect("message");
    assert_eq!(packet, EnginePacket::Message(r#"2["response",{"ok":true}]"#.to_owned()));
}

#[test]
fn decode_rejects_empty_and_unknown_frames() {
    assert!(matches!(EnginePacket::decode(""), Err(CodecError::Empty)));
    assert!(matches!(
        EnginePacket::decode("9"),
        Err(CodecError::UnknownType { layer: "engine.io", found: '9' })
    ));
}

#[test]
fn decode_rejects_base64_binary() {
    assert!(matches!(EnginePacket::decode("bAQID"), Err(CodecError::UnsupportedBinary)));
}

#[test]
fn decode_open_with_bad_json_is_payload_error() {
    assert!(matches!(EnginePacket::decode("0{not json"), Err(CodecError::Payload(_))));
}

// =============================================================
// encode
// =============================================================

#[test]
fn encode_pong_echoes_probe() {
    assert_eq!(EnginePacket::Pong(None).encode().expect("pong"), "3");
    assert_eq!(EnginePacket::Pong(Some("probe".to_owned())).encode().expect("pong"), "3probe");
}

#[test]
fn encode_message_prefixes_type() {
    assert_eq!(EnginePacket::Message("40".to_owned()).encode().expect("message"), "440");
}
