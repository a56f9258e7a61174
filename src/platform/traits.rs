// Chat platform trait: the actions the moderation agent can take.
//
// Every action is attempted once; callers decide whether a failure matters.

use anyhow::Result;
use async_trait::async_trait;

use super::models::ChannelInfo;

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Look up a channel by id. `Ok(None)` means the channel doesn't exist
    /// or isn't visible to the bot.
    async fn resolve_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>>;

    /// Post a message to a channel.
    async fn send_channel_message(&self, channel_id: &str, content: &str) -> Result<()>;

    /// Delete a message from a channel.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;

    /// Send a private message to a user.
    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()>;
}
