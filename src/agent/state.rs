// Agent connection lifecycle.
//
//   Disconnected -> Connecting -> Ready <-> Processing
//                        |          |
//                        +----------+--> Disconnected

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Connecting,
    Ready,
    /// Handling one message; back to Ready when the handler returns.
    Processing,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Disconnected => "disconnected",
            AgentState::Connecting => "connecting",
            AgentState::Ready => "ready",
            AgentState::Processing => "processing",
        }
    }

    /// Whether a message event can be handled in this state.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, AgentState::Ready)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ready_accepts_messages() {
        assert!(AgentState::Ready.accepts_messages());
        assert!(!AgentState::Processing.accepts_messages());
        assert!(!AgentState::Connecting.accepts_messages());
        assert!(!AgentState::Disconnected.accepts_messages());
    }

    #[test]
    fn test_display() {
        assert_eq!(AgentState::Connecting.to_string(), "connecting");
    }
}
