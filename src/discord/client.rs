// Discord REST client: the moderation actions, over HTTP.
//
// A thin reqwest wrapper authenticated with the bot token. Implements the
// ChatPlatform trait so the agent never touches Discord types directly.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{Channel, User};
use crate::platform::{ChannelInfo, ChatPlatform};

/// Default REST endpoint (API v10).
pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";

/// Authenticated HTTP client for the Discord REST API.
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl DiscordClient {
    /// Create a client for `base_url` using the given bot token.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("DiscordBot (chatguard, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Full URL for an API path such as `/users/@me`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        debug!(method = %method, path = path, "Discord REST request");

        let mut request = self
            .client
            .request(method.clone(), self.endpoint(path))
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(&body);
        }

        request
            .send()
            .await
            .with_context(|| format!("Discord request failed: {method} {path}"))
    }

    async fn json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let response = ensure_success(response, what).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to deserialize {what} response"))
    }

    /// Fetch the bot's own user. A 401 here means the token is invalid.
    pub async fn current_user(&self) -> Result<User> {
        let response = self.send(Method::GET, "/users/@me", None).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            anyhow::bail!("Discord rejected the bot token (401 Unauthorized). Check DISCORD_TOKEN.");
        }
        Self::json(response, "current user").await
    }

    /// Fetch a channel. `Ok(None)` when it doesn't exist or the bot can't see it.
    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let response = self
            .send(Method::GET, &format!("/channels/{channel_id}"), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            _ => Self::json::<Channel>(response, "channel").await.map(Some),
        }
    }

    /// Open (or reuse) the DM channel with a user.
    pub async fn create_dm(&self, user_id: &str) -> Result<Channel> {
        let body = serde_json::json!({ "recipient_id": user_id });
        let response = self
            .send(Method::POST, "/users/@me/channels", Some(body))
            .await?;
        Self::json(response, "DM channel").await
    }

    /// Post a plain-text message to a channel.
    pub async fn create_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let body = serde_json::json!({
            "content": content,
            "allowed_mentions": { "parse": [] }
        });
        let response = self
            .send(
                Method::POST,
                &format!("/channels/{channel_id}/messages"),
                Some(body),
            )
            .await?;
        ensure_success(response, "create message").await?;
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn resolve_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>> {
        Ok(self.get_channel(channel_id).await?.map(ChannelInfo::from))
    }

    async fn send_channel_message(&self, channel_id: &str, content: &str) -> Result<()> {
        self.create_message(channel_id, content).await
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let response = self
            .send(
                Method::DELETE,
                &format!("/channels/{channel_id}/messages/{message_id}"),
                None,
            )
            .await?;
        ensure_success(response, "delete message").await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()> {
        let dm = self.create_dm(user_id).await?;
        self.create_message(&dm.id, content).await
    }
}

/// Turn a non-2xx response into an error carrying Discord's message body.
async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("Discord {what} returned {status}: {body}")
}
