// Unit tests for Discord payload handling.
//
// Tests gateway frame interpretation and serde deserialization of the
// objects the bot reads, all without network access.

use std::time::Duration;

use chatguard::discord::gateway::{
    close_outcome, interpret_payload, reconnect_delay, ConnectionEnd, FrameAction, ResumeState,
};
use chatguard::discord::models::{Channel, GatewayPayload, Hello};
use chatguard::platform::{ChannelInfo, PlatformEvent};

fn payload(json: &str) -> GatewayPayload {
    serde_json::from_str(json).unwrap()
}

// ============================================================
// Dispatch events
// ============================================================

#[test]
fn message_create_becomes_chat_message() {
    let frame = payload(
        r#"{
            "op": 0,
            "s": 5,
            "t": "MESSAGE_CREATE",
            "d": {
                "id": "1300000000000000001",
                "channel_id": "1326432814593343613",
                "guild_id": "1200000000000000000",
                "content": "hello there",
                "timestamp": "2025-01-06T18:02:11.123000+00:00",
                "author": {
                    "id": "42",
                    "username": "alice_01",
                    "global_name": "Alice",
                    "discriminator": "0"
                },
                "attachments": [],
                "embeds": []
            }
        }"#,
    );

    let FrameAction::Emit(PlatformEvent::MessageCreated(msg)) = interpret_payload(frame) else {
        panic!("expected a MessageCreated event");
    };
    assert_eq!(msg.id, "1300000000000000001");
    assert_eq!(msg.channel_id, "1326432814593343613");
    assert_eq!(msg.content, "hello there");
    assert_eq!(msg.author.id, "42");
    assert_eq!(msg.author.name, "Alice");
}

#[test]
fn message_without_content_field_has_empty_text() {
    // Discord omits content when the MESSAGE_CONTENT intent isn't granted
    let frame = payload(
        r#"{"op": 0, "s": 6, "t": "MESSAGE_CREATE", "d": {
            "id": "1", "channel_id": "2",
            "author": {"id": "3", "username": "bob"}
        }}"#,
    );
    let FrameAction::Emit(PlatformEvent::MessageCreated(msg)) = interpret_payload(frame) else {
        panic!("expected a MessageCreated event");
    };
    assert_eq!(msg.content, "");
    assert_eq!(msg.author.name, "bob");
}

#[test]
fn ready_carries_bot_identity_and_resume_state() {
    let frame = payload(
        r#"{"op": 0, "s": 1, "t": "READY", "d": {
            "v": 10,
            "session_id": "abc",
            "resume_gateway_url": "wss://gateway-us-east1-b.discord.gg",
            "user": {"id": "999", "username": "chatguard", "bot": true},
            "guilds": []
        }}"#,
    );
    match interpret_payload(frame) {
        FrameAction::Ready { user, resume } => {
            assert_eq!(user.id, "999");
            assert_eq!(user.name, "chatguard");
            assert_eq!(
                resume,
                ResumeState {
                    session_id: "abc".to_string(),
                    resume_gateway_url: Some("wss://gateway-us-east1-b.discord.gg".to_string()),
                }
            );
        }
        other => panic!("expected Ready, got {other:?}"),
    }
}

#[test]
fn ready_without_session_id_ends_the_session() {
    let frame = payload(
        r#"{"op": 0, "s": 1, "t": "READY", "d": {"user": {"id": "999", "username": "chatguard"}}}"#,
    );
    assert!(matches!(interpret_payload(frame), FrameAction::End(_)));
}

#[test]
fn resumed_dispatch_is_recognised() {
    let frame = payload(r#"{"op": 0, "s": 40, "t": "RESUMED", "d": {}}"#);
    assert_eq!(interpret_payload(frame), FrameAction::Resumed);
}

#[test]
fn unsubscribed_dispatch_is_ignored() {
    let frame = payload(r#"{"op": 0, "s": 2, "t": "TYPING_START", "d": {"channel_id": "1"}}"#);
    assert_eq!(interpret_payload(frame), FrameAction::Ignore);
}

#[test]
fn malformed_message_create_is_skipped() {
    let frame = payload(r#"{"op": 0, "s": 3, "t": "MESSAGE_CREATE", "d": {"id": "1"}}"#);
    assert_eq!(interpret_payload(frame), FrameAction::Ignore);
}

// ============================================================
// Control opcodes
// ============================================================

#[test]
fn heartbeat_request_asks_for_immediate_heartbeat() {
    let frame = payload(r#"{"op": 1, "d": null}"#);
    assert_eq!(interpret_payload(frame), FrameAction::Heartbeat);
}

#[test]
fn heartbeat_ack_is_reported() {
    let frame = payload(r#"{"op": 11}"#);
    assert_eq!(interpret_payload(frame), FrameAction::HeartbeatAck);
}

#[test]
fn reconnect_request_resumes() {
    let reconnect = payload(r#"{"op": 7, "d": null}"#);
    assert_eq!(
        interpret_payload(reconnect),
        FrameAction::Reconnect { resume: true }
    );
}

#[test]
fn invalid_session_resumes_only_when_resumable() {
    let resumable = payload(r#"{"op": 9, "d": true}"#);
    assert_eq!(
        interpret_payload(resumable),
        FrameAction::Reconnect { resume: true }
    );

    let gone = payload(r#"{"op": 9, "d": false}"#);
    assert_eq!(
        interpret_payload(gone),
        FrameAction::Reconnect { resume: false }
    );
}

// ============================================================
// Close codes and backoff
// ============================================================

#[test]
fn configuration_close_codes_are_fatal() {
    for code in [4004, 4010, 4011, 4012, 4013, 4014] {
        assert!(
            matches!(close_outcome(Some(code), ""), ConnectionEnd::Fatal(_)),
            "close code {code} should be fatal"
        );
    }
    let ConnectionEnd::Fatal(reason) = close_outcome(Some(4004), "Authentication failed.") else {
        panic!("4004 should be fatal");
    };
    assert!(reason.contains("DISCORD_TOKEN"), "got: {reason}");
}

#[test]
fn expired_session_close_codes_identify_again() {
    for code in [4007, 4009] {
        assert!(matches!(
            close_outcome(Some(code), ""),
            ConnectionEnd::Reidentify(_)
        ));
    }
}

#[test]
fn other_closes_are_resumable() {
    for code in [Some(1001), Some(1006), Some(4000), Some(4008), None] {
        assert!(
            matches!(close_outcome(code, "going away"), ConnectionEnd::Resume(_)),
            "close {code:?} should be resumable"
        );
    }
}

#[test]
fn reconnect_delay_grows_and_is_capped() {
    assert_eq!(reconnect_delay(0), Duration::from_secs(1));
    assert_eq!(reconnect_delay(1), Duration::from_secs(2));
    assert_eq!(reconnect_delay(3), Duration::from_secs(8));
    assert_eq!(reconnect_delay(6), Duration::from_secs(60));
    assert_eq!(reconnect_delay(40), Duration::from_secs(60));
}

#[test]
fn deserialize_hello() {
    let frame = payload(r#"{"op": 10, "d": {"heartbeat_interval": 41250}}"#);
    let hello: Hello = serde_json::from_value(frame.d).unwrap();
    assert_eq!(hello.heartbeat_interval, 41250);
}

// ============================================================
// REST objects
// ============================================================

#[test]
fn guild_channel_keeps_name() {
    let json = r#"{"id": "1326432814593343613", "type": 0, "name": "general", "guild_id": "1"}"#;
    let channel: Channel = serde_json::from_str(json).unwrap();
    let info: ChannelInfo = channel.into();
    assert_eq!(info.id, "1326432814593343613");
    assert_eq!(info.name.as_deref(), Some("general"));
}

#[test]
fn dm_channel_has_no_name() {
    let json = r#"{"id": "77", "type": 1, "recipients": [{"id": "42", "username": "alice"}]}"#;
    let channel: Channel = serde_json::from_str(json).unwrap();
    let info: ChannelInfo = channel.into();
    assert!(info.name.is_none());
}
