//! Wire-independent transport types

/// Operator message received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_is_bot: bool,
    pub text: String,
}

/// Event emitted by a game connection
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Server accepted the login
    LoggedIn,
    /// In-game chat line; `extra` holds the additional chat components
    Chat { text: String, extra: Vec<String> },
    /// Player was kicked; the connection ends right after
    Kicked { reason: String },
    /// Non-fatal protocol error reported by the server or the client
    ProtocolError { message: String },
    /// Connection closed for good
    Ended { reason: String },
}

impl GameEvent {
    /// Whether this event terminates the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameEvent::Kicked { .. } | GameEvent::Ended { .. })
    }
}

/// Error types for chat and game transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Send error: {0}")]
    SendError(String),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Connection closed")]
    Closed,
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(
            GameEvent::Kicked {
                reason: "bye".to_string()
            }
            .is_terminal()
        );
        assert!(
            GameEvent::Ended {
                reason: "closed".to_string()
            }
            .is_terminal()
        );
        assert!(!GameEvent::LoggedIn.is_terminal());
        assert!(
            !GameEvent::ProtocolError {
                message: "bad packet".to_string()
            }
            .is_terminal()
        );
    }
}
