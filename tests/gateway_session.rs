// Gateway session tests against a local WebSocket server.
//
// The server plays Discord's side of the handshake over plain ws:// on
// 127.0.0.1, so these run without network access. They check that routine
// reconnects are resumed inside the session and never reach the agent as
// a Disconnected event.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;

use chatguard::discord::gateway::GatewaySession;
use chatguard::discord::models::DEFAULT_INTENTS;
use chatguard::platform::PlatformEvent;

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(10);

// ============================================================
// Fake gateway helpers
// ============================================================

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text frame as JSON, skipping pings and other control frames.
async fn recv_json(ws: &mut ServerSocket) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

fn hello(heartbeat_interval: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval}})
}

fn ready(resume_url: &str) -> Value {
    json!({"op": 0, "s": 1, "t": "READY", "d": {
        "v": 10,
        "session_id": "sess-1",
        "resume_gateway_url": resume_url,
        "user": {"id": "999", "username": "chatguard", "bot": true}
    }})
}

fn message_create(seq: u64, id: &str) -> Value {
    json!({"op": 0, "s": seq, "t": "MESSAGE_CREATE", "d": {
        "id": id,
        "channel_id": "1326432814593343613",
        "content": "hello again",
        "author": {"id": "42", "username": "alice"}
    }})
}

async fn close_with(ws: &mut ServerSocket, code: u16) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: Utf8Bytes::from_static("Authentication failed."),
    };
    let _ = ws.send(Message::Close(Some(frame))).await;
}

async fn next_event(events: &mut tokio::sync::mpsc::Receiver<PlatformEvent>) -> PlatformEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a gateway event")
        .expect("event stream closed")
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    (listener, base)
}

// ============================================================
// Tests
// ============================================================

#[tokio::test]
async fn reconnect_request_is_resumed_transparently() {
    let (listener, base) = bind().await;
    let resume_url = base.clone();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let identify = recv_json(&mut ws).await;
        send_json(&mut ws, ready(&resume_url)).await;
        send_json(&mut ws, json!({"op": 7, "d": null})).await;

        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let resume = recv_json(&mut ws).await;
        send_json(&mut ws, json!({"op": 0, "s": 2, "t": "RESUMED", "d": {}})).await;
        send_json(&mut ws, message_create(3, "m-after-resume")).await;

        // Ends the test: a close the bot can't recover from
        close_with(&mut ws, 4004).await;
        (identify, resume)
    });

    let url = format!("{base}/?v=10&encoding=json");
    let (session, mut events) = GatewaySession::connect(&url, "tok", DEFAULT_INTENTS)
        .await
        .unwrap();

    match next_event(&mut events).await {
        PlatformEvent::Ready { user } => assert_eq!(user.id, "999"),
        other => panic!("expected Ready, got {other:?}"),
    }
    match next_event(&mut events).await {
        PlatformEvent::MessageCreated(msg) => assert_eq!(msg.id, "m-after-resume"),
        other => panic!("expected the message sent after resuming, got {other:?}"),
    }
    match next_event(&mut events).await {
        PlatformEvent::Disconnected { reason } => assert!(reason.contains("4004"), "got: {reason}"),
        other => panic!("expected Disconnected, got {other:?}"),
    }

    let (identify, resume) = server.await.unwrap();
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "tok");
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "sess-1");
    assert_eq!(resume["d"]["seq"], 1);

    session.close().await;
}

#[tokio::test]
async fn missing_heartbeat_ack_triggers_resume() {
    let (listener, base) = bind().await;
    let resume_url = base.clone();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(100)).await;
        let _identify = recv_json(&mut ws).await;
        send_json(&mut ws, ready(&resume_url)).await;

        // Never ACK; the client should give up on this socket.
        let mut heartbeats = 0;
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["op"] == 1 {
                    heartbeats += 1;
                }
            }
        }

        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let resume = recv_json(&mut ws).await;
        close_with(&mut ws, 4004).await;
        (heartbeats, resume)
    });

    let url = format!("{base}/?v=10&encoding=json");
    let (session, mut events) = GatewaySession::connect(&url, "tok", DEFAULT_INTENTS)
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        PlatformEvent::Ready { .. }
    ));
    // The next event is the fatal close on the resumed connection, not a
    // disconnect for the silent one.
    match next_event(&mut events).await {
        PlatformEvent::Disconnected { reason } => assert!(reason.contains("4004"), "got: {reason}"),
        other => panic!("expected Disconnected, got {other:?}"),
    }

    let (heartbeats, resume) = server.await.unwrap();
    assert_eq!(heartbeats, 1);
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "sess-1");

    session.close().await;
}

#[tokio::test]
async fn bad_token_close_during_identify_is_fatal() {
    let (listener, base) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let _identify = recv_json(&mut ws).await;
        close_with(&mut ws, 4004).await;
    });

    let url = format!("{base}/?v=10&encoding=json");
    let (session, mut events) = GatewaySession::connect(&url, "bad", DEFAULT_INTENTS)
        .await
        .unwrap();

    match next_event(&mut events).await {
        PlatformEvent::Disconnected { reason } => {
            assert!(reason.contains("DISCORD_TOKEN"), "got: {reason}")
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    server.await.unwrap();
    session.close().await;
}
