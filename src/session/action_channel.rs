//! Action Channel for asynchronous event processing

use anyhow::Result;
use tokio::sync::mpsc;

use super::lifecycle::{StartOutcome, SweepReport};

/// Where a deferred reply should go
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyTarget {
    pub channel_id: String,
    pub sender_id: String,
}

/// Relay events for communication between components
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Session finished logging in
    SessionReady { name: String },
    /// Session connection ended for good
    SessionEnded { name: String, reason: String },
    /// Session reported a protocol error
    SessionError { name: String, message: String },
    /// In-game chat seen by a session
    GameChat {
        name: String,
        text: String,
        extra: Vec<String>,
    },
    /// Background bring-up finished
    BringUpFinished {
        origin: ReplyTarget,
        outcome: StartOutcome,
    },
    /// Background join sweep finished
    JoinSweepFinished {
        origin: ReplyTarget,
        report: SweepReport,
    },
    /// Shutdown request
    ShutdownRequested,
}

/// Action channel for event processing
pub struct ActionChannel {
    /// Event sender
    event_tx: mpsc::UnboundedSender<RelayEvent>,
    /// Event receiver
    event_rx: Option<mpsc::UnboundedReceiver<RelayEvent>>,
}

impl Clone for ActionChannel {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            event_rx: None, // Receivers cannot be cloned
        }
    }
}

impl ActionChannel {
    /// Create a new ActionChannel
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Send event to channel
    pub fn send_event(&self, event: RelayEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))
    }

    /// Get next event from channel
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        if let Some(event_rx) = &mut self.event_rx {
            event_rx.recv().await
        } else {
            None
        }
    }

    /// Send shutdown request
    pub fn request_shutdown(&self) -> Result<()> {
        self.send_event(RelayEvent::ShutdownRequested)
    }
}

impl Default for ActionChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_only_sends() {
        let mut channel = ActionChannel::new();
        let mut clone = channel.clone();

        clone.request_shutdown().unwrap();
        assert!(matches!(
            channel.next_event().await,
            Some(RelayEvent::ShutdownRequested)
        ));
        assert!(clone.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let mut channel = ActionChannel::new();
        let sender = channel.clone();

        sender
            .send_event(RelayEvent::SessionReady {
                name: "A".to_string(),
            })
            .unwrap();
        sender.request_shutdown().unwrap();

        assert!(matches!(
            channel.next_event().await,
            Some(RelayEvent::SessionReady { ref name }) if name == "A"
        ));
        assert!(matches!(
            channel.next_event().await,
            Some(RelayEvent::ShutdownRequested)
        ));
    }
}
