// Platform-neutral message and event types.

/// The account that sent a message (or the bot's own account).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
}

/// An inbound message. Read-only; the only thing the agent ever does to it
/// is ask the platform to delete it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    pub author: Author,
    pub content: String,
}

/// A channel as resolved by the platform. Direct-message channels have no name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: Option<String>,
}

/// Events delivered to the agent, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// Handshake finished; `user` is the bot's own account.
    Ready { user: Author },
    MessageCreated(ChatMessage),
    /// The session ended and could not be resumed or re-established.
    Disconnected { reason: String },
}
