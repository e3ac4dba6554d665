//! Wire-format tests for the Engine.IO / Socket.IO codec.
//!
//! Frames below are as captured from a Socket.IO v4 server running the
//! appointment notification endpoints.

use rstest::rstest;
use serde_json::json;
use socket_transport::{EnginePacket, PacketError, SocketPacket};

/// Outbound frames the client produces for each room intent
#[rstest]
#[case(SocketPacket::event("join-hospital", vec![json!(42)]), r#"42["join-hospital",42]"#)]
#[case(SocketPacket::event("leave-hospital", vec![json!("h-17")]), r#"42["leave-hospital","h-17"]"#)]
#[case(SocketPacket::event("join-admin", vec![]), r#"42["join-admin"]"#)]
#[case(SocketPacket::event("leave-admin", vec![]), r#"42["leave-admin"]"#)]
#[case(SocketPacket::Connect { sid: None }, "40")]
#[case(SocketPacket::Disconnect, "41")]
fn test_outbound_room_frames(#[case] packet: SocketPacket, #[case] expected: &str) {
    assert_eq!(packet.into_engine().encode(), expected);
}

/// Inbound frames the dashboards subscribe to
#[rstest]
#[case(
    r#"42["rendez-vous-notification",{"message":"RDV #9 en attente"}]"#,
    "rendez-vous-notification",
    json!({ "message": "RDV #9 en attente" })
)]
#[case(
    r#"42["rendez-vous-update",{"appointmentId":9,"status":"confirmed"}]"#,
    "rendez-vous-update",
    json!({ "appointmentId": 9, "status": "confirmed" })
)]
#[case(
    r#"42/,["rendez-vous-update",{}]"#,
    "rendez-vous-update",
    json!({})
)]
fn test_inbound_event_frames(
    #[case] frame: &str,
    #[case] expected_name: &str,
    #[case] expected_payload: serde_json::Value,
) {
    let EnginePacket::Message(data) = EnginePacket::decode(frame).expect("valid engine frame") else {
        panic!("Expected a message packet for {}", frame);
    };

    match SocketPacket::decode(&data).expect("valid socket packet") {
        SocketPacket::Event { name, args, ack_id } => {
            assert_eq!(name, expected_name);
            assert_eq!(args, vec![expected_payload]);
            assert_eq!(ack_id, None);
        }
        other => panic!("Expected event, got {:?}", other),
    }
}

/// Malformed frames are rejected rather than guessed at
#[rstest]
#[case("", PacketError::Empty)]
#[case("2{\"not\":\"an array\"}", PacketError::MissingEventName)]
#[case("2[42]", PacketError::MissingEventName)]
#[case("2[]", PacketError::MissingEventName)]
#[case("9", PacketError::UnknownType('9'))]
#[case("3[\"ack\"]", PacketError::Unsupported("ack".to_string()))]
#[case("51-[\"upload\",{\"_placeholder\":true,\"num\":0}]", PacketError::Unsupported("binary attachment".to_string()))]
fn test_rejected_socket_packets(#[case] data: &str, #[case] expected: PacketError) {
    assert_eq!(SocketPacket::decode(data).unwrap_err(), expected);
}

#[test]
fn test_event_without_payload_is_invalid_json() {
    assert!(matches!(
        SocketPacket::decode("2"),
        Err(PacketError::InvalidJson(_))
    ));
}

#[test]
fn test_engine_control_packets() {
    assert_eq!(EnginePacket::decode("1").unwrap(), EnginePacket::Close);
    assert_eq!(EnginePacket::decode("5").unwrap(), EnginePacket::Upgrade);
    assert_eq!(EnginePacket::decode("6").unwrap(), EnginePacket::Noop);
    assert_eq!(
        EnginePacket::decode("3probe").unwrap(),
        EnginePacket::Pong("probe".to_string())
    );
    assert_eq!(EnginePacket::Ping("probe".to_string()).encode(), "2probe");
    assert!(matches!(
        EnginePacket::decode("bAQID"),
        Err(PacketError::Unsupported(_))
    ));
}

#[test]
fn test_polling_batch_encoding() {
    let batch = vec![
        EnginePacket::Pong(String::new()),
        SocketPacket::event("join-admin", vec![]).into_engine(),
    ];
    let body = EnginePacket::encode_payload(&batch);
    assert_eq!(body, "3\u{1e}42[\"join-admin\"]");
    assert_eq!(EnginePacket::decode_payload(&body).unwrap(), batch);
    assert!(EnginePacket::decode_payload("").unwrap().is_empty());
}
