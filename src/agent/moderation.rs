// Moderation agent: platform events in, delete/notify actions out.
//
// For each message that isn't the bot's own:
// 1. Classify the text
// 2. If any label triggers, delete the message
// 3. DM the author which labels triggered
//
// Steps 2 and 3 are independent best-effort calls. A failed delete doesn't
// skip the DM, a failed DM doesn't undo the delete, and neither stops the
// event loop.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state::AgentState;
use crate::config::{Config, DEFAULT_GREETING};
use crate::output::truncate_chars;
use crate::platform::{Author, ChatMessage, ChatPlatform, PlatformEvent};
use crate::toxicity::labels::{join_labels, Label, DEFAULT_THRESHOLD};
use crate::toxicity::traits::ToxicityClassifier;

/// Name used in notifications for channels without one (DMs).
const UNNAMED_CHANNEL: &str = "direct messages";

/// Agent behaviour that comes from configuration.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub threshold: f64,
    pub greeting_channel_id: Option<String>,
    pub greeting_message: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            greeting_channel_id: None,
            greeting_message: DEFAULT_GREETING.to_string(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.threshold,
            greeting_channel_id: config.greeting_channel_id.clone(),
            greeting_message: config.greeting_message.clone(),
        }
    }
}

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationOutcome {
    /// Not classified: our own message, or the agent isn't Ready.
    Ignored,
    /// Classified, nothing triggered, message left alone.
    Clean,
    /// Labels triggered; records whether each action went through.
    Flagged {
        labels: Vec<Label>,
        deleted: bool,
        notified: bool,
    },
    /// Classification itself failed; message left alone.
    Failed,
}

/// The private notice sent to a flagged author.
pub fn notification_text(channel_name: &str, labels: &[Label]) -> String {
    format!(
        "Your message in `{}` was flagged as: {}. \
         Please adhere to the community guidelines and maintain a positive environment.",
        channel_name,
        join_labels(labels)
    )
}

pub struct ModerationAgent {
    classifier: Arc<dyn ToxicityClassifier>,
    platform: Arc<dyn ChatPlatform>,
    settings: AgentSettings,
    state: AgentState,
    /// The bot's own account, known after Ready
    identity: Option<Author>,
    greeted: bool,
}

impl ModerationAgent {
    pub fn new(
        classifier: Arc<dyn ToxicityClassifier>,
        platform: Arc<dyn ChatPlatform>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            classifier,
            platform,
            settings,
            state: AgentState::Disconnected,
            identity: None,
            greeted: false,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn identity(&self) -> Option<&Author> {
        self.identity.as_ref()
    }

    /// Consume platform events until the session ends.
    ///
    /// Events are handled one at a time, in order. Returns an error when the
    /// platform disconnects, since that is never a clean exit; returns Ok
    /// only if the event stream closes without a disconnect notice.
    pub async fn run(&mut self, mut events: mpsc::Receiver<PlatformEvent>) -> Result<()> {
        self.transition(AgentState::Connecting);

        while let Some(event) = events.recv().await {
            match event {
                PlatformEvent::Ready { user } => self.handle_ready(user).await,
                PlatformEvent::MessageCreated(message) => {
                    self.handle_message(&message).await;
                }
                PlatformEvent::Disconnected { reason } => {
                    let was = self.state;
                    self.transition(AgentState::Disconnected);
                    if was == AgentState::Connecting {
                        anyhow::bail!("Failed to connect to the chat platform: {reason}");
                    }
                    anyhow::bail!("Lost connection to the chat platform: {reason}");
                }
            }
        }

        self.transition(AgentState::Disconnected);
        Ok(())
    }

    /// Explicit shutdown.
    pub fn shutdown(&mut self) {
        self.transition(AgentState::Disconnected);
    }

    /// Handshake finished: remember who we are and greet once.
    pub async fn handle_ready(&mut self, user: Author) {
        info!(user = %user.name, id = %user.id, "Connected to chat platform");
        self.identity = Some(user);
        self.transition(AgentState::Ready);

        if !self.greeted {
            self.greeted = true;
            self.greet().await;
        }
    }

    /// Run one message through the moderation pipeline.
    pub async fn handle_message(&mut self, message: &ChatMessage) -> ModerationOutcome {
        if !self.state.accepts_messages() {
            debug!(state = %self.state, message_id = %message.id, "Dropping message, agent not ready");
            return ModerationOutcome::Ignored;
        }

        // Our own greetings and notices must never be classified.
        if self
            .identity
            .as_ref()
            .is_some_and(|me| me.id == message.author.id)
        {
            return ModerationOutcome::Ignored;
        }

        self.transition(AgentState::Processing);
        let outcome = self.moderate(message).await;
        self.transition(AgentState::Ready);
        outcome
    }

    async fn moderate(&self, message: &ChatMessage) -> ModerationOutcome {
        let labels = match self
            .classifier
            .classify(&message.content, self.settings.threshold)
            .await
        {
            Ok(labels) => labels,
            Err(e) => {
                warn!(error = %e, message_id = %message.id, "Classification failed, leaving message");
                return ModerationOutcome::Failed;
            }
        };

        if labels.is_empty() {
            debug!(message_id = %message.id, "Message is clean");
            return ModerationOutcome::Clean;
        }

        info!(
            message_id = %message.id,
            author = %message.author.name,
            labels = %join_labels(&labels),
            text_preview = %truncate_chars(&message.content, 50),
            "Flagged message"
        );

        let channel_name = self.channel_name(&message.channel_id).await;

        let deleted = match self
            .platform
            .delete_message(&message.channel_id, &message.id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, message_id = %message.id, "Failed to delete flagged message");
                false
            }
        };

        let notice = notification_text(&channel_name, &labels);
        let notified = match self
            .platform
            .send_direct_message(&message.author.id, &notice)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                // Usually the author has DMs from server members turned off.
                warn!(error = %e, author = %message.author.id, "Failed to notify author");
                false
            }
        };

        ModerationOutcome::Flagged {
            labels,
            deleted,
            notified,
        }
    }

    /// Channel name for the notice. Lookup failures fall back to the raw id.
    async fn channel_name(&self, channel_id: &str) -> String {
        match self.platform.resolve_channel(channel_id).await {
            Ok(Some(channel)) => channel.name.unwrap_or_else(|| UNNAMED_CHANNEL.to_string()),
            Ok(None) => channel_id.to_string(),
            Err(e) => {
                warn!(error = %e, channel_id, "Channel lookup failed");
                channel_id.to_string()
            }
        }
    }

    /// Post the greeting to the configured channel, if it resolves.
    async fn greet(&self) {
        let Some(channel_id) = self.settings.greeting_channel_id.as_deref() else {
            return;
        };

        match self.platform.resolve_channel(channel_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(channel_id, "Greeting channel not found, skipping greeting");
                return;
            }
            Err(e) => {
                warn!(error = %e, channel_id, "Greeting channel lookup failed, skipping greeting");
                return;
            }
        }

        match self
            .platform
            .send_channel_message(channel_id, &self.settings.greeting_message)
            .await
        {
            Ok(()) => info!(channel_id, "Sent greeting"),
            Err(e) => warn!(error = %e, channel_id, "Failed to send greeting"),
        }
    }

    fn transition(&mut self, next: AgentState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Agent state change");
            self.state = next;
        }
    }
}
