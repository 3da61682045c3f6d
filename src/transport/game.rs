//! Game gateway WebSocket client
//!
//! Each login gets its own WebSocket. The client attaches with the account
//! credentials, then exchanges `input` lines and receives `output` chat.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, info, warn};

use super::types::{GameEvent, TransportError};
use super::{GameConnection, GameHandle, GameTransport};
use crate::config::{AccountConfig, GameConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Frames sent by the game gateway
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum GameOut {
    Hello {},
    Attached {},
    Output {
        text: String,
        #[serde(default)]
        extra: Vec<String>,
    },
    Err {
        text: String,
    },
    Kicked {
        reason: String,
    },
    Pong {},
}

/// Frames sent to the game gateway
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum GameIn<'a> {
    Attach {
        name: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<&'a str>,
        auth: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<&'a str>,
        is_bot: bool,
    },
    Input {
        line: &'a str,
    },
    Ping {},
}

/// Opens one WebSocket per account against the configured game gateway
#[derive(Debug, Clone)]
pub struct WsGameTransport {
    server_url: String,
    version: Option<String>,
}

impl WsGameTransport {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            version: config.version.clone(),
        }
    }
}

#[async_trait]
impl GameTransport for WsGameTransport {
    async fn connect(&self, account: &AccountConfig) -> Result<GameConnection, TransportError> {
        let (ws_stream, _) = connect_async(self.server_url.as_str())
            .await
            .map_err(|e| {
                TransportError::ConnectionError(format!(
                    "Failed to connect to {}: {}",
                    self.server_url, e
                ))
            })?;
        info!(
            "Connected to game gateway at {} as {}",
            self.server_url, account.username
        );

        let (mut sink, source) = ws_stream.split();

        let attach = serde_json::to_string(&GameIn::Attach {
            name: &account.username,
            email: account.email.as_deref(),
            password: account.password.as_deref(),
            auth: &account.auth,
            version: self.version.as_deref(),
            is_bot: true,
        })?;
        sink.send(Message::Text(attach)).await?;

        let sink = Arc::new(Mutex::new(sink));
        let (event_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            account.username.clone(),
            source,
            sink.clone(),
            event_tx,
        ));

        Ok(GameConnection {
            handle: Box::new(WsGameHandle {
                name: account.username.clone(),
                sink,
            }),
            events,
        })
    }
}

struct WsGameHandle {
    name: String,
    sink: Arc<Mutex<WsSink>>,
}

#[async_trait]
impl GameHandle for WsGameHandle {
    async fn chat(&self, text: &str) -> Result<(), TransportError> {
        let frame = serde_json::to_string(&GameIn::Input { line: text })?;
        self.sink
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::SendError(format!("{}: {}", self.name, e)))
    }

    async fn quit(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Error closing game connection for {}: {}", self.name, e);
        }
    }
}

/// Pump frames from the gateway into `event_tx` until the socket or the receiver goes away
async fn read_loop(
    name: String,
    mut source: WsSource,
    sink: Arc<Mutex<WsSink>>,
    event_tx: mpsc::UnboundedSender<GameEvent>,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    let reason = loop {
        tokio::select! {
            frame = source.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => break format!("connection error: {}", e),
                    None => break "connection closed".to_string(),
                };

                let event = match message {
                    Message::Text(text) => match serde_json::from_str::<GameOut>(&text) {
                        Ok(frame) => map_frame(frame),
                        Err(e) => {
                            debug!("Ignoring unparseable frame for {}: {}", name, e);
                            None
                        }
                    },
                    Message::Close(frame) => {
                        break frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "connection closed".to_string());
                    }
                    _ => None,
                };

                if let Some(event) = event {
                    let terminal = event.is_terminal();
                    if event_tx.send(event).is_err() {
                        debug!("Event receiver for {} dropped, stopping reader", name);
                        return;
                    }
                    if terminal {
                        info!("Game connection for {} terminated by server", name);
                        return;
                    }
                }
            }
            _ = ping.tick() => {
                let frame = match serde_json::to_string(&GameIn::Ping {}) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to encode ping for {}: {}", name, e);
                        continue;
                    }
                };
                if let Err(e) = sink.lock().await.send(Message::Text(frame)).await {
                    debug!("Ping failed for {}: {}", name, e);
                }
            }
        }
    };

    info!("Game connection for {} ended: {}", name, reason);
    let _ = event_tx.send(GameEvent::Ended { reason });
}

fn map_frame(frame: GameOut) -> Option<GameEvent> {
    match frame {
        GameOut::Hello {} | GameOut::Pong {} => None,
        GameOut::Attached {} => Some(GameEvent::LoggedIn),
        GameOut::Output { text, extra } => Some(GameEvent::Chat { text, extra }),
        GameOut::Err { text } => Some(GameEvent::ProtocolError { message: text }),
        GameOut::Kicked { reason } => Some(GameEvent::Kicked { reason }),
    }
}
