use liveservice_common::protocol::{
    live_event::{EventType, LiveEvent, LiveEventBody, VideoCallPayload},
    stomp::{
        decode_frame, encode_frame, Command, Inbound, StompFrame, ACCESS_TOKEN_HEADER, ID_HEADER,
        PROTOCOL_VERSION, STOMP_SUBPROTOCOLS,
    },
};

#[test]
fn stomp_contract_prefers_version_one_two() {
    assert_eq!(PROTOCOL_VERSION, "1.2");
    assert_eq!(STOMP_SUBPROTOCOLS[0], "v12.stomp");
}

#[test]
fn stomp_contract_native_header_names_match_clients() {
    assert_eq!(ACCESS_TOKEN_HEADER, "accessToken");
    assert_eq!(ID_HEADER, "id");
}

#[test]
fn stomp_contract_client_frames_from_stomp_js_decode() {
    // Frames as emitted by the browser client library, one per WebSocket message.
    let samples = [
        ("CONNECT\naccessToken:token\naccept-version:1.2,1.1,1.0\nheart-beat:10000,10000\n\n\0", Command::Connect),
        ("SUBSCRIBE\nid:sub-0\ndestination:/user/events\nack:client-individual\n\n\0", Command::Subscribe),
        ("ACK\nid:2b1f0c8e-7c0b-4b8e-9a51-8f0e5b8e3c7d\n\n\0", Command::Ack),
        ("DISCONNECT\nreceipt:close-1\n\n\0", Command::Disconnect),
    ];

    for (raw, expected) in samples {
        match decode_frame(raw) {
            Ok(Inbound::Frame(frame)) => assert_eq!(frame.command(), expected),
            other => panic!("expected {expected} frame, got {other:?}"),
        }
    }
}

#[test]
fn stomp_contract_message_body_shape() {
    let event = LiveEvent::new(
        EventType::VideoCallRequest,
        vec!["1".to_owned()],
        Some(VideoCallPayload {
            rc_group_id: Some("group".to_owned()),
            ..VideoCallPayload::default()
        }),
    );
    let body = serde_json::to_string(&event.body()).expect("body should serialize");
    let frame = StompFrame::new(Command::Message).with_body(body);

    let Ok(Inbound::Frame(decoded)) = decode_frame(&encode_frame(&frame)) else {
        panic!("encoded message frame should decode");
    };
    let parsed: LiveEventBody =
        serde_json::from_str(decoded.body()).expect("message body should be json");

    assert_eq!(parsed.event_type, EventType::VideoCallRequest);
    assert_eq!(
        parsed.event_content.and_then(|content| content.rc_group_id).as_deref(),
        Some("group")
    );
}
