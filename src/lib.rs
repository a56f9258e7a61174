// Chatguard: toxic message moderation for Discord
//
// This is the library root. Each module corresponds to one layer of the
// bot: the classifier, the platform boundary and its Discord adapter, and
// the agent that connects them.

pub mod agent;
pub mod config;
pub mod discord;
pub mod output;
pub mod platform;
pub mod toxicity;
