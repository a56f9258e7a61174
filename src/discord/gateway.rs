// Discord gateway session: the inbound event stream.
//
// One supervisor task owns the WebSocket. Each connection waits for Hello,
// sends Identify (or Resume when a session is already established), then
// reads frames and heartbeats at the interval the server asked for, all in
// one select loop. Dispatches become PlatformEvents on an mpsc channel.
//
// Dropped connections, Reconnect (op 7), resumable Invalid Session (op 9),
// and a heartbeat that goes unacknowledged all lead to a resume on the
// host READY named. A non-resumable Invalid Session starts a fresh session
// with Identify. Only the close codes that mean the configuration is wrong,
// or a run of failed reconnects, end the stream with a Disconnected event.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::models::{
    heartbeat_frame, identify_frame, resume_frame, GatewayPayload, Hello, MessageCreate, Ready,
    OP_DISPATCH, OP_HEARTBEAT, OP_HEARTBEAT_ACK, OP_HELLO, OP_INVALID_SESSION, OP_RECONNECT,
};
use crate::platform::{Author, PlatformEvent};

/// Default gateway endpoint (API v10, JSON encoding).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Query string every gateway URL needs, including resume hosts.
const GATEWAY_QUERY: &str = "?v=10&encoding=json";

/// Buffered events between the gateway task and the agent.
const EVENT_BUFFER: usize = 100;

/// Consecutive reconnects that never reach READY/RESUMED before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// How long `close` waits for the close frame to go out.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What is needed to resume a session after the socket drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeState {
    pub session_id: String,
    pub resume_gateway_url: Option<String>,
}

/// What the connection loop should do with one decoded frame.
#[derive(Debug, PartialEq)]
pub enum FrameAction {
    /// READY: a new session. Carries what a later resume needs.
    Ready {
        user: Author,
        resume: ResumeState,
    },
    /// RESUMED: missed events have been replayed.
    Resumed,
    /// Forward an event to the agent.
    Emit(PlatformEvent),
    /// The server asked for an immediate heartbeat.
    Heartbeat,
    HeartbeatAck,
    /// Nothing to do (dispatches we don't subscribe to, unknown opcodes).
    Ignore,
    /// Drop this connection and open another. `resume` is false when the
    /// session is gone and a fresh Identify is needed.
    Reconnect { resume: bool },
    /// The session cannot continue.
    End(String),
}

/// How one connection ended, and what the supervisor does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Reconnect and resume the same session.
    Resume(String),
    /// Reconnect and Identify as a new session.
    Reidentify(String),
    /// Stop; reported to the agent as Disconnected.
    Fatal(String),
    /// Shutdown was requested or the agent stopped listening.
    Stopped,
}

/// Decide what a gateway frame means for the bot.
///
/// A MESSAGE_CREATE that fails to deserialize is skipped with a warning; a
/// single odd event shouldn't take the bot down.
pub fn interpret_payload(payload: GatewayPayload) -> FrameAction {
    match payload.op {
        OP_DISPATCH => match payload.t.as_deref() {
            Some("READY") => match serde_json::from_value::<Ready>(payload.d) {
                Ok(ready) => FrameAction::Ready {
                    user: ready.user.into(),
                    resume: ResumeState {
                        session_id: ready.session_id,
                        resume_gateway_url: ready.resume_gateway_url,
                    },
                },
                Err(e) => FrameAction::End(format!("malformed READY payload: {e}")),
            },
            Some("RESUMED") => FrameAction::Resumed,
            Some("MESSAGE_CREATE") => match serde_json::from_value::<MessageCreate>(payload.d) {
                Ok(msg) => FrameAction::Emit(PlatformEvent::MessageCreated(msg.into())),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed MESSAGE_CREATE payload");
                    FrameAction::Ignore
                }
            },
            _ => FrameAction::Ignore,
        },
        OP_HEARTBEAT => FrameAction::Heartbeat,
        OP_HEARTBEAT_ACK => FrameAction::HeartbeatAck,
        OP_RECONNECT => FrameAction::Reconnect { resume: true },
        // d is true when the session can still be resumed
        OP_INVALID_SESSION => FrameAction::Reconnect {
            resume: payload.d.as_bool().unwrap_or(false),
        },
        other => {
            debug!(op = other, "Ignoring gateway opcode");
            FrameAction::Ignore
        }
    }
}

/// Human-readable reason for a close, naming the codes that mean the
/// configuration is wrong.
pub fn describe_close(code: Option<u16>, reason: &str) -> String {
    let Some(code) = code else {
        return "gateway closed the connection".to_string();
    };
    let meaning = match code {
        4004 => "authentication failed, check DISCORD_TOKEN",
        4010 => "invalid shard",
        4011 => "sharding required",
        4012 => "invalid API version",
        4013 | 4014 => "invalid or disallowed intents, enable Message Content in the developer portal",
        _ => reason,
    };
    format!("gateway closed the connection ({code}: {meaning})")
}

/// What a close frame means for the session.
///
/// 4004 and 4010-4014 can't be fixed by reconnecting. 4007 (bad sequence)
/// and 4009 (session timed out) need a new session. Anything else is
/// resumable.
pub fn close_outcome(code: Option<u16>, reason: &str) -> ConnectionEnd {
    let description = describe_close(code, reason);
    match code {
        Some(4004) | Some(4010..=4014) => ConnectionEnd::Fatal(description),
        Some(4007) | Some(4009) => ConnectionEnd::Reidentify(description),
        _ => ConnectionEnd::Resume(description),
    }
}

/// Backoff before reconnect attempt `attempt` (0 = first try after a drop).
pub fn reconnect_delay(attempt: u32) -> Duration {
    let delay = Duration::from_secs(1u64 << attempt.min(6));
    delay.min(MAX_RECONNECT_DELAY)
}

/// Resume hosts arrive without the version query.
fn with_gateway_query(url: &str) -> String {
    if url.contains('?') {
        url.to_string()
    } else {
        format!("{}/{}", url.trim_end_matches('/'), GATEWAY_QUERY)
    }
}

fn close_parts(frame: Option<&CloseFrame>) -> (Option<u16>, String) {
    match frame {
        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_string()),
        None => (None, String::new()),
    }
}

/// Session bookkeeping carried across connections.
#[derive(Debug, Default)]
struct SessionState {
    resume: Option<ResumeState>,
    /// Last dispatch sequence number seen
    sequence: Option<u64>,
    /// Set when the current connection reached READY or RESUMED
    established: bool,
}

impl SessionState {
    fn connect_url(&self, default_url: &str) -> String {
        match &self.resume {
            Some(ResumeState {
                resume_gateway_url: Some(url),
                ..
            }) => with_gateway_query(url),
            _ => default_url.to_string(),
        }
    }

    /// The opening frame for the next connection.
    fn handshake(&self, token: &str, intents: u64) -> String {
        match &self.resume {
            Some(resume) => resume_frame(token, &resume.session_id, self.sequence),
            None => identify_frame(token, intents),
        }
    }

    fn forget_session(&mut self) {
        self.resume = None;
        self.sequence = None;
    }
}

struct GatewayConfig {
    url: String,
    token: String,
    intents: u64,
}

/// A live gateway session. Call `close` to shut it down.
pub struct GatewaySession {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GatewaySession {
    /// Connect and start streaming events.
    ///
    /// The first connection must reach Hello, so an unreachable gateway is a
    /// startup error. The READY event (or the close frame rejecting the
    /// token) arrives on the returned channel.
    pub async fn connect(
        url: &str,
        token: &str,
        intents: u64,
    ) -> Result<(Self, mpsc::Receiver<PlatformEvent>)> {
        let first = open(url).await?;

        let config = GatewayConfig {
            url: url.to_string(),
            token: token.to_string(),
            intents,
        };
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(config, first, tx, shutdown_rx));

        Ok((Self { shutdown, task }, rx))
    }

    /// Close the socket and stop the gateway task.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            debug!("Gateway task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Connect the socket and wait for Hello.
async fn open(url: &str) -> Result<(WsStream, Hello)> {
    let (mut ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to Discord gateway at {url}"))?;
    let hello = wait_for_hello(&mut ws).await?;
    debug!(
        heartbeat_interval_ms = hello.heartbeat_interval,
        "Received gateway Hello"
    );
    Ok((ws, hello))
}

async fn wait_for_hello(ws: &mut WsStream) -> Result<Hello> {
    while let Some(frame) = ws.next().await {
        match frame.context("Gateway connection failed before Hello")? {
            Message::Text(text) => {
                let payload: GatewayPayload =
                    serde_json::from_str(&text).context("Malformed gateway frame")?;
                if payload.op != OP_HELLO {
                    anyhow::bail!("Expected gateway Hello, got opcode {}", payload.op);
                }
                return serde_json::from_value(payload.d).context("Malformed Hello payload");
            }
            Message::Close(frame) => {
                let (code, reason) = close_parts(frame.as_ref());
                anyhow::bail!(describe_close(code, &reason))
            }
            _ => continue,
        }
    }
    anyhow::bail!("Gateway closed before sending Hello")
}

/// Sleep before a reconnect. False if shutdown was requested meanwhile.
async fn wait_or_stop(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

async fn supervise(
    config: GatewayConfig,
    first: (WsStream, Hello),
    tx: mpsc::Sender<PlatformEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut state = SessionState::default();
    let mut next = Some(first);
    let mut failures: u32 = 0;

    let reason = loop {
        let connection = match next.take() {
            Some(connection) => connection,
            None => match open(&state.connect_url(&config.url)).await {
                Ok(connection) => connection,
                Err(e) => {
                    failures += 1;
                    if failures > MAX_RECONNECT_ATTEMPTS {
                        break format!(
                            "giving up after {MAX_RECONNECT_ATTEMPTS} reconnect attempts: {e:#}"
                        );
                    }
                    warn!(error = %e, attempt = failures, "Gateway reconnect failed");
                    if !wait_or_stop(reconnect_delay(failures), &mut shutdown).await {
                        return;
                    }
                    continue;
                }
            },
        };

        let handshake = state.handshake(&config.token, config.intents);
        state.established = false;

        let end = run_connection(connection, handshake, &mut state, &tx, &mut shutdown).await;
        let last = match end {
            ConnectionEnd::Stopped => return,
            ConnectionEnd::Fatal(reason) => break reason,
            ConnectionEnd::Resume(reason) => {
                info!(reason = %reason, "Gateway connection dropped, resuming");
                reason
            }
            ConnectionEnd::Reidentify(reason) => {
                info!(reason = %reason, "Gateway session lost, identifying again");
                state.forget_session();
                reason
            }
        };

        if state.established {
            failures = 0;
        } else {
            failures += 1;
            if failures > MAX_RECONNECT_ATTEMPTS {
                break format!(
                    "giving up after {MAX_RECONNECT_ATTEMPTS} reconnect attempts: {last}"
                );
            }
        }

        if !wait_or_stop(reconnect_delay(failures), &mut shutdown).await {
            return;
        }
    };

    info!(reason = %reason, "Gateway session ended");
    let _ = tx.send(PlatformEvent::Disconnected { reason }).await;
}

/// Drive one socket until it ends.
///
/// Resumable endings just drop the socket: a close frame with 1000/1001
/// would invalidate the session on Discord's side.
async fn run_connection(
    (ws, hello): (WsStream, Hello),
    handshake: String,
    state: &mut SessionState,
    tx: &mpsc::Sender<PlatformEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectionEnd {
    let (mut sink, mut stream) = ws.split();

    if let Err(e) = sink.send(Message::text(handshake)).await {
        return ConnectionEnd::Resume(format!("handshake failed: {e}"));
    }

    let period = Duration::from_millis(hello.heartbeat_interval);
    let mut ticker = interval_at(Instant::now() + period, period);
    let mut awaiting_ack = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if awaiting_ack {
                    return ConnectionEnd::Resume("no heartbeat ACK since the last heartbeat".to_string());
                }
                if let Err(e) = sink.send(Message::text(heartbeat_frame(state.sequence))).await {
                    return ConnectionEnd::Resume(format!("heartbeat failed: {e}"));
                }
                awaiting_ack = true;
            }

            _ = shutdown.changed() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(error = %e, "Gateway close frame not sent");
                }
                return ConnectionEnd::Stopped;
            }

            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => return ConnectionEnd::Resume(format!("gateway connection error: {e}")),
                    None => return ConnectionEnd::Resume("gateway stream ended".to_string()),
                };

                let payload: GatewayPayload = match frame {
                    Message::Text(text) => match serde_json::from_str(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "Skipping unparseable gateway frame");
                            continue;
                        }
                    },
                    Message::Close(frame) => {
                        let (code, reason) = close_parts(frame.as_ref());
                        return close_outcome(code, &reason);
                    }
                    _ => continue,
                };

                if let Some(s) = payload.s {
                    state.sequence = Some(s);
                }

                match interpret_payload(payload) {
                    FrameAction::Ready { user, resume } => {
                        info!(session_id = %resume.session_id, "Gateway session ready");
                        state.resume = Some(resume);
                        state.established = true;
                        if tx.send(PlatformEvent::Ready { user }).await.is_err() {
                            return ConnectionEnd::Stopped;
                        }
                    }
                    FrameAction::Resumed => {
                        info!("Gateway session resumed");
                        state.established = true;
                    }
                    FrameAction::Emit(event) => {
                        if tx.send(event).await.is_err() {
                            return ConnectionEnd::Stopped;
                        }
                    }
                    FrameAction::Heartbeat => {
                        if let Err(e) = sink.send(Message::text(heartbeat_frame(state.sequence))).await {
                            return ConnectionEnd::Resume(format!("heartbeat failed: {e}"));
                        }
                        awaiting_ack = true;
                    }
                    FrameAction::HeartbeatAck => awaiting_ack = false,
                    FrameAction::Ignore => {}
                    FrameAction::Reconnect { resume: true } => {
                        return ConnectionEnd::Resume("gateway requested reconnect".to_string());
                    }
                    FrameAction::Reconnect { resume: false } => {
                        return ConnectionEnd::Reidentify("gateway invalidated the session".to_string());
                    }
                    FrameAction::End(reason) => return ConnectionEnd::Fatal(reason),
                }
            }
        }
    }
}
