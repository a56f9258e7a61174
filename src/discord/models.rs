// Serde types for the slice of the Discord API the bot uses.
//
// Only fields the bot reads are declared; serde ignores the rest. Ids are
// snowflakes, which Discord sends as strings.

use serde::{Deserialize, Serialize};

use crate::platform::{Author, ChannelInfo, ChatMessage};

// -- Gateway opcodes --

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RESUME: u8 = 6;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

// -- Gateway intents --

pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
pub const INTENT_DIRECT_MESSAGES: u64 = 1 << 12;
pub const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Message events from guilds and DMs, with their text content.
pub const DEFAULT_INTENTS: u64 =
    INTENT_GUILD_MESSAGES | INTENT_DIRECT_MESSAGES | INTENT_MESSAGE_CONTENT;

/// Envelope of every gateway frame.
#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// Data of the Hello frame (op 10).
#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Serialize)]
struct OutgoingPayload<T: Serialize> {
    op: u8,
    d: T,
}

#[derive(Debug, Serialize)]
struct Identify<'a> {
    token: &'a str,
    intents: u64,
    properties: IdentifyProperties,
}

#[derive(Debug, Serialize)]
struct IdentifyProperties {
    os: &'static str,
    browser: &'static str,
    device: &'static str,
}

/// Serialized Identify frame (op 2).
pub fn identify_frame(token: &str, intents: u64) -> String {
    let payload = OutgoingPayload {
        op: OP_IDENTIFY,
        d: Identify {
            token,
            intents,
            properties: IdentifyProperties {
                os: std::env::consts::OS,
                browser: "chatguard",
                device: "chatguard",
            },
        },
    };
    serde_json::to_string(&payload).unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct Resume<'a> {
    token: &'a str,
    session_id: &'a str,
    seq: Option<u64>,
}

/// Serialized Resume frame (op 6): picks the session up where `sequence` left off.
pub fn resume_frame(token: &str, session_id: &str, sequence: Option<u64>) -> String {
    serde_json::to_string(&OutgoingPayload {
        op: OP_RESUME,
        d: Resume {
            token,
            session_id,
            seq: sequence,
        },
    })
    .unwrap_or_default()
}

/// Serialized Heartbeat frame (op 1) carrying the last sequence number seen.
pub fn heartbeat_frame(sequence: Option<u64>) -> String {
    serde_json::to_string(&OutgoingPayload {
        op: OP_HEARTBEAT,
        d: sequence,
    })
    .unwrap_or_default()
}

/// A Discord user object.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

/// READY dispatch data.
#[derive(Debug, Deserialize)]
pub struct Ready {
    pub user: User,
    pub session_id: String,
    /// Host to reconnect to when resuming this session
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

/// MESSAGE_CREATE dispatch data.
#[derive(Debug, Deserialize)]
pub struct MessageCreate {
    pub id: String,
    pub channel_id: String,
    pub author: User,
    /// Empty unless the MESSAGE_CONTENT intent is granted
    #[serde(default)]
    pub content: String,
}

/// A channel object from `GET /channels/{id}` or `POST /users/@me/channels`.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<User> for Author {
    fn from(user: User) -> Self {
        Author {
            name: user.global_name.unwrap_or(user.username),
            id: user.id,
        }
    }
}

impl From<MessageCreate> for ChatMessage {
    fn from(msg: MessageCreate) -> Self {
        ChatMessage {
            id: msg.id,
            channel_id: msg.channel_id,
            author: msg.author.into(),
            content: msg.content,
        }
    }
}

impl From<Channel> for ChannelInfo {
    fn from(channel: Channel) -> Self {
        ChannelInfo {
            id: channel.id,
            name: channel.name,
        }
    }
}
