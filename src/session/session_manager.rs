//! Relay Manager: the single loop that serializes operator commands and session events

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics::RelayStats;
use crate::relay::EventRelay;
use crate::transport::{ChatOutbound, GameTransport, InboundMessage};

use super::action_channel::{ActionChannel, RelayEvent, ReplyTarget};
use super::command_router::{CommandDispatcher, SideEffect};
use super::context::RelayContext;
use super::lifecycle::{BringUpTicket, StartOutcome};

/// Manager loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Running,
    ShuttingDown,
    Terminated,
}

/// Owns the relay context and processes one input at a time
pub struct RelayManager {
    /// Application configuration
    config: Config,
    /// Registry, focus and lifecycle
    context: Arc<RelayContext>,
    /// Command dispatcher
    dispatcher: CommandDispatcher,
    /// Outward event formatting
    relay: EventRelay,
    /// Outward chat side
    outbound: Arc<dyn ChatOutbound>,
    /// Session and background-task events
    action_channel: ActionChannel,
    /// Shared counters
    stats: Arc<RelayStats>,
    /// Loop state
    state: ManagerState,
}

impl RelayManager {
    /// Create a new RelayManager
    pub fn new(
        config: Config,
        transport: Arc<dyn GameTransport>,
        outbound: Arc<dyn ChatOutbound>,
    ) -> Self {
        info!("Creating new RelayManager");

        let action_channel = ActionChannel::new();
        let stats = Arc::new(RelayStats::new());
        let context = RelayContext::new(transport, action_channel.clone(), config.timing.clone());
        let dispatcher = CommandDispatcher::with_stats(context.clone(), &config, stats.clone());

        let log_channel_id =
            Some(config.chat.log_channel_id.clone()).filter(|channel| !channel.is_empty());
        let relay = EventRelay::new(
            outbound.clone(),
            log_channel_id,
            stats.clone(),
        );

        Self {
            config,
            context,
            dispatcher,
            relay,
            outbound,
            action_channel,
            stats,
            state: ManagerState::Running,
        }
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Sender half of the event channel
    pub fn events(&self) -> ActionChannel {
        self.action_channel.clone()
    }

    /// Run until `stop_all`, Ctrl-C or the inbound stream closing
    pub async fn run(&mut self, inbound: mpsc::UnboundedReceiver<InboundMessage>) -> Result<()> {
        self.run_until(inbound, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `stop_all`, `shutdown` resolving or the inbound stream closing
    pub async fn run_until<F>(
        &mut self,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Starting relay loop");
        tokio::pin!(shutdown);

        while self.state == ManagerState::Running {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    self.shutdown().await;
                }

                message = inbound.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        warn!("Inbound chat stream closed");
                        self.shutdown().await;
                    }
                },

                Some(event) = self.action_channel.next_event() => {
                    self.handle_event(event).await;
                }
            }
        }

        info!("Relay loop terminated");
        Ok(())
    }

    /// Handle one inbound chat message
    async fn handle_message(&mut self, message: InboundMessage) {
        let Some(outcome) = self.dispatcher.handle(&message).await else {
            return;
        };

        if let Some(reply) = &outcome.reply {
            let text = reply.render(&message.sender_id);
            self.send(&message.channel_id, &text).await;
        }

        let origin = ReplyTarget {
            channel_id: message.channel_id,
            sender_id: message.sender_id,
        };

        match outcome.effect {
            SideEffect::None => {}
            SideEffect::StartAll(ticket) => self.spawn_start_all(origin, ticket),
            SideEffect::JoinSweep => self.spawn_join_sweep(origin),
            SideEffect::Terminate => {
                sleep(self.config.timing.stop_flush()).await;
                self.shutdown().await;
            }
        }
    }

    /// Handle one session or background-task event
    async fn handle_event(&mut self, event: RelayEvent) {
        debug!("Handling event: {:?}", event);

        match event {
            RelayEvent::ShutdownRequested => self.shutdown().await,
            event => self.relay.relay(&event).await,
        }
    }

    fn spawn_start_all(&self, origin: ReplyTarget, ticket: BringUpTicket) {
        let context = self.context.clone();
        let accounts = self.config.accounts.clone();
        let channel = self.action_channel.clone();

        tokio::spawn(async move {
            let report = context.lifecycle.run_bring_up(ticket, &accounts).await;
            let event = RelayEvent::BringUpFinished {
                origin,
                outcome: StartOutcome::Completed(report),
            };
            if let Err(e) = channel.send_event(event) {
                error!("Failed to report bring-up result: {}", e);
            }
        });
    }

    fn spawn_join_sweep(&self, origin: ReplyTarget) {
        let context = self.context.clone();
        let line = self.config.join_command.clone();
        let channel = self.action_channel.clone();

        tokio::spawn(async move {
            let report = context.lifecycle.join_all(&line).await;
            if let Err(e) = channel.send_event(RelayEvent::JoinSweepFinished { origin, report }) {
                error!("Failed to report join sweep result: {}", e);
            }
        });
    }

    async fn send(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.outbound.send(channel_id, text).await {
            self.stats.relay_failed();
            warn!("Failed to send reply to {}: {}", channel_id, e);
        }
    }

    /// Close every session and stop the loop
    async fn shutdown(&mut self) {
        if self.state != ManagerState::Running {
            return;
        }

        info!("Shutting down relay");
        self.state = ManagerState::ShuttingDown;

        self.context.lifecycle.shutdown_all().await;

        let snapshot = self.stats.snapshot();
        info!(
            "Relay stats: uptime {}s, {} commands, {} refused, {} events relayed, {} relay failures",
            snapshot.uptime_secs,
            snapshot.commands_processed,
            snapshot.commands_refused,
            snapshot.events_relayed,
            snapshot.relay_failures
        );

        self.state = ManagerState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::transport::mock::{MockChatOutbound, MockGameTransport};

    fn manager_with(
        transport: &MockGameTransport,
        outbound: &MockChatOutbound,
    ) -> RelayManager {
        let mut config = Config::default();
        config.controllers = vec!["U1".to_string()];
        config.accounts = vec![AccountConfig::offline("A"), AccountConfig::offline("B")];
        config.chat.log_channel_id = "log".to_string();
        RelayManager::new(config, Arc::new(transport.clone()), Arc::new(outbound.clone()))
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_loop() {
        let transport = MockGameTransport::new();
        let outbound = MockChatOutbound::new();
        let mut manager = manager_with(&transport, &outbound);
        let (_tx, rx) = mpsc::unbounded_channel();

        manager.run_until(rx, async {}).await.unwrap();
        assert_eq!(manager.state(), ManagerState::Terminated);
    }

    #[tokio::test]
    async fn test_closed_inbound_stops_loop() {
        let transport = MockGameTransport::new();
        let outbound = MockChatOutbound::new();
        let mut manager = manager_with(&transport, &outbound);
        let (tx, rx) = mpsc::unbounded_channel::<InboundMessage>();
        drop(tx);

        manager
            .run_until(rx, std::future::pending())
            .await
            .unwrap();
        assert_eq!(manager.state(), ManagerState::Terminated);
    }

    #[tokio::test]
    async fn test_shutdown_request_event_stops_loop() {
        let transport = MockGameTransport::new();
        let outbound = MockChatOutbound::new();
        let mut manager = manager_with(&transport, &outbound);
        let (_tx, rx) = mpsc::unbounded_channel();

        manager.events().request_shutdown().unwrap();
        manager
            .run_until(rx, std::future::pending())
            .await
            .unwrap();
        assert_eq!(manager.state(), ManagerState::Terminated);
    }
}
