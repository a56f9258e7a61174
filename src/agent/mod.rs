// Moderation agent: wires platform events to the classifier and the
// delete/notify actions.

pub mod moderation;
pub mod state;

pub use moderation::{notification_text, AgentSettings, ModerationAgent, ModerationOutcome};
pub use state::AgentState;
