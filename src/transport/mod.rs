//! Transport seams for the chat platform and the game servers
//!
//! The relay core only talks to these traits. Concrete websocket clients live in
//! `gateway` (chat side) and `game` (game side); `mock` provides in-memory versions.

pub mod game;
pub mod gateway;
pub mod mock;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::AccountConfig;

pub use game::WsGameTransport;
pub use gateway::ChatGateway;
pub use types::{GameEvent, InboundMessage, TransportError};

/// Outward side of the chat platform
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Post `text` to the channel identified by `channel_id`
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), TransportError>;
}

/// Live connection to one game server login
#[async_trait]
pub trait GameHandle: Send + Sync {
    /// Send a chat line (or slash command) as this player
    async fn chat(&self, text: &str) -> Result<(), TransportError>;

    /// Leave the server. Errors are swallowed; the connection is going away anyway.
    async fn quit(&self);
}

/// A freshly opened game connection and its event stream
pub struct GameConnection {
    pub handle: Box<dyn GameHandle>,
    pub events: mpsc::UnboundedReceiver<GameEvent>,
}

/// Factory for game connections
#[async_trait]
pub trait GameTransport: Send + Sync {
    async fn connect(&self, account: &AccountConfig) -> Result<GameConnection, TransportError>;
}
