// Chat platform boundary: what the moderation agent needs from a chat
// service, independent of which service it is.
//
// Actions go through the ChatPlatform trait; inbound traffic arrives as a
// stream of PlatformEvents. The Discord adapter implements both sides.

pub mod models;
pub mod traits;

pub use models::{Author, ChannelInfo, ChatMessage, PlatformEvent};
pub use traits::ChatPlatform;
