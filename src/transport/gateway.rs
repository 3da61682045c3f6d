//! Chat gateway WebSocket client
//!
//! Identifies with the bot token, turns `message` frames into [`InboundMessage`]s
//! and sends outward text as `send` frames.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, error, info, warn};

use super::ChatOutbound;
use super::types::{InboundMessage, TransportError};
use crate::config::ChatConfig;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Frames sent by the chat gateway
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum GatewayOut {
    Ready {
        user_id: String,
    },
    Message {
        message_id: String,
        channel_id: String,
        author_id: String,
        #[serde(default)]
        author_is_bot: bool,
        content: String,
    },
}

/// Frames sent to the chat gateway
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum GatewayIn<'a> {
    Identify { token: &'a str },
    Send { channel_id: &'a str, content: &'a str },
}

/// Connected chat gateway; cloneable outward handle
#[derive(Clone)]
pub struct ChatGateway {
    sink: Arc<Mutex<WsSink>>,
}

impl ChatGateway {
    /// Connect, identify and start forwarding inbound messages
    pub async fn connect(
        config: &ChatConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundMessage>)> {
        let (ws_stream, _) = connect_async(config.gateway_url.as_str())
            .await
            .with_context(|| format!("Failed to connect to chat gateway: {}", config.gateway_url))?;
        info!("Connected to chat gateway at {}", config.gateway_url);

        let (mut sink, mut source) = ws_stream.split();

        let identify = serde_json::to_string(&GatewayIn::Identify {
            token: &config.token,
        })?;
        sink.send(Message::Text(identify))
            .await
            .context("Failed to identify with chat gateway")?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Chat gateway read error: {}", e);
                        break;
                    }
                };

                match serde_json::from_str::<GatewayOut>(&text) {
                    Ok(GatewayOut::Ready { user_id }) => {
                        info!("Chat gateway session ready as {}", user_id);
                    }
                    Ok(GatewayOut::Message {
                        message_id,
                        channel_id,
                        author_id,
                        author_is_bot,
                        content,
                    }) => {
                        let message = InboundMessage {
                            message_id,
                            channel_id,
                            sender_id: author_id,
                            sender_is_bot: author_is_bot,
                            text: content,
                        };
                        if inbound_tx.send(message).is_err() {
                            debug!("Inbound receiver dropped, stopping chat gateway reader");
                            return;
                        }
                    }
                    Err(e) => debug!("Ignoring unknown chat gateway frame: {}", e),
                }
            }
            warn!("Chat gateway connection closed");
        });

        Ok((
            Self {
                sink: Arc::new(Mutex::new(sink)),
            },
            inbound_rx,
        ))
    }
}

#[async_trait]
impl ChatOutbound for ChatGateway {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        let frame = serde_json::to_string(&GatewayIn::Send {
            channel_id,
            content: text,
        })?;
        self.sink.lock().await.send(Message::Text(frame)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_frame() {
        let frame: GatewayOut = serde_json::from_str(
            r#"{"op":"message","message_id":"m1","channel_id":"c1","author_id":"U1","content":"!help"}"#,
        )
        .unwrap();
        match frame {
            GatewayOut::Message {
                author_id,
                author_is_bot,
                content,
                ..
            } => {
                assert_eq!(author_id, "U1");
                assert!(!author_is_bot);
                assert_eq!(content, "!help");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_send_frame_shape() {
        let frame = serde_json::to_string(&GatewayIn::Send {
            channel_id: "c1",
            content: "hi",
        })
        .unwrap();
        assert_eq!(frame, r#"{"op":"send","channel_id":"c1","content":"hi"}"#);
    }
}
