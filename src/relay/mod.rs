//! Outward notifications for session events
//!
//! Every [`RelayEvent`] becomes at most one chat message. Session-level events go
//! to the configured log channel; replies to deferred commands go back to the
//! channel the command came from. Failed sends are logged and counted only.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::metrics::RelayStats;
use crate::session::action_channel::{RelayEvent, ReplyTarget};
use crate::session::command_router::Reply;
use crate::session::lifecycle::StartOutcome;
use crate::transport::ChatOutbound;

/// Remove `§x` formatting codes from game text
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

/// Game chat line with its extra components appended
pub fn format_game_chat(name: &str, text: &str, extra: &[String]) -> String {
    let mut line = strip_formatting(text).trim().to_string();
    for part in extra {
        let part = strip_formatting(part);
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(part);
    }
    format!("[{}] {}", name, line)
}

pub struct EventRelay {
    outbound: Arc<dyn ChatOutbound>,
    log_channel_id: Option<String>,
    stats: Arc<RelayStats>,
}

impl EventRelay {
    pub fn new(
        outbound: Arc<dyn ChatOutbound>,
        log_channel_id: Option<String>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            outbound,
            log_channel_id,
            stats,
        }
    }

    /// Destination and text for `event`, if it produces a message
    pub fn render(&self, event: &RelayEvent) -> Option<(String, String)> {
        match event {
            RelayEvent::SessionReady { name } => {
                self.to_log(format!("`{}` logged in and is ready!", name))
            }
            RelayEvent::SessionEnded { name, reason } => {
                self.to_log(format!("`{}` disconnected: {}", name, reason))
            }
            RelayEvent::SessionError { name, message } => {
                self.to_log(format!("`{}` hit an error: {}", name, message))
            }
            RelayEvent::GameChat { name, text, extra } => {
                self.to_log(format_game_chat(name, text, extra))
            }
            RelayEvent::BringUpFinished { origin, outcome } => {
                let text = match outcome {
                    StartOutcome::Completed(report) if report.failed.is_empty() => format!(
                        "All {} game sessions have started!",
                        report.started.len()
                    ),
                    StartOutcome::Completed(report) => {
                        let failed = report
                            .failed
                            .iter()
                            .map(|(name, _)| format!("`{}`", name))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!(
                            "Started {} of {} game sessions. Failed: {}",
                            report.started.len(),
                            report.total,
                            failed
                        )
                    }
                    StartOutcome::AlreadyStarted => {
                        "The game sessions have already started!".to_string()
                    }
                };
                Some(Self::to_origin(origin, &text))
            }
            RelayEvent::JoinSweepFinished { origin, report } => Some(Self::to_origin(
                origin,
                &format!(
                    "Sent the join command to {} of {} session(s)!",
                    report.delivered.len(),
                    report.attempted()
                ),
            )),
            RelayEvent::ShutdownRequested => None,
        }
    }

    /// Send the message for `event`, if any
    pub async fn relay(&self, event: &RelayEvent) {
        let Some((channel_id, text)) = self.render(event) else {
            return;
        };

        match self.outbound.send(&channel_id, &text).await {
            Ok(()) => {
                self.stats.event_relayed();
                debug!("Relayed to {}: {}", channel_id, text);
            }
            Err(e) => {
                self.stats.relay_failed();
                warn!("Failed to relay event to {}: {}", channel_id, e);
            }
        }
    }

    fn to_log(&self, text: String) -> Option<(String, String)> {
        match &self.log_channel_id {
            Some(channel_id) => Some((channel_id.clone(), text)),
            None => {
                debug!("No log channel configured, dropping: {}", text);
                None
            }
        }
    }

    fn to_origin(origin: &ReplyTarget, text: &str) -> (String, String) {
        let reply = Reply::Mention(text.to_string());
        (origin.channel_id.clone(), reply.render(&origin.sender_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::lifecycle::{BringUpReport, SweepReport};
    use crate::transport::mock::MockChatOutbound;
    use std::time::Duration;

    fn relay_with(outbound: &MockChatOutbound) -> (EventRelay, Arc<RelayStats>) {
        let stats = Arc::new(RelayStats::new());
        let relay = EventRelay::new(
            Arc::new(outbound.clone()),
            Some("log".to_string()),
            stats.clone(),
        );
        (relay, stats)
    }

    fn origin() -> ReplyTarget {
        ReplyTarget {
            channel_id: "ops".to_string(),
            sender_id: "U1".to_string(),
        }
    }

    #[test]
    fn test_strip_formatting() {
        assert_eq!(strip_formatting("§aGreen §lbold§r text"), "Green bold text");
        assert_eq!(strip_formatting("plain"), "plain");
        assert_eq!(strip_formatting("trailing§"), "trailing");
    }

    #[test]
    fn test_format_game_chat_appends_extra() {
        let extra = vec!["  §eworld ".to_string(), "   ".to_string(), "!".to_string()];
        assert_eq!(
            format_game_chat("A", "§6<Bob> hello", &extra),
            "[A] <Bob> hello world !"
        );
        assert_eq!(format_game_chat("A", "", &["joined".to_string()]), "[A] joined");
    }

    #[tokio::test]
    async fn test_session_events_go_to_log_channel() {
        let outbound = MockChatOutbound::new();
        let (relay, stats) = relay_with(&outbound);

        relay
            .relay(&RelayEvent::SessionReady {
                name: "A".to_string(),
            })
            .await;
        relay
            .relay(&RelayEvent::GameChat {
                name: "A".to_string(),
                text: "<Bob> hi".to_string(),
                extra: Vec::new(),
            })
            .await;
        relay
            .relay(&RelayEvent::SessionEnded {
                name: "A".to_string(),
                reason: "kicked: afk".to_string(),
            })
            .await;

        assert_eq!(
            outbound.texts_in("log"),
            vec![
                "`A` logged in and is ready!",
                "[A] <Bob> hi",
                "`A` disconnected: kicked: afk",
            ]
        );
        assert_eq!(stats.snapshot().events_relayed, 3);
    }

    #[tokio::test]
    async fn test_bring_up_report_goes_to_origin() {
        let outbound = MockChatOutbound::new();
        let (relay, _) = relay_with(&outbound);

        let report = BringUpReport {
            total: 3,
            started: vec!["A".to_string(), "C".to_string()],
            failed: vec![("B".to_string(), "refused".to_string())],
            elapsed: Duration::from_secs(5),
        };
        relay
            .relay(&RelayEvent::BringUpFinished {
                origin: origin(),
                outcome: StartOutcome::Completed(report),
            })
            .await;
        relay
            .relay(&RelayEvent::JoinSweepFinished {
                origin: origin(),
                report: SweepReport {
                    delivered: vec!["A".to_string()],
                    failed: vec![("C".to_string(), "closed".to_string())],
                },
            })
            .await;

        assert_eq!(
            outbound.texts_in("ops"),
            vec![
                "<@U1> Started 2 of 3 game sessions. Failed: `B`",
                "<@U1> Sent the join command to 1 of 2 session(s)!",
            ]
        );
        assert!(outbound.texts_in("log").is_empty());
    }

    #[test]
    fn test_origin_replies_render_as_mentions() {
        let outbound = MockChatOutbound::new();
        let (relay, _) = relay_with(&outbound);

        let rendered = relay.render(&RelayEvent::BringUpFinished {
            origin: origin(),
            outcome: StartOutcome::AlreadyStarted,
        });
        let expected = Reply::Mention("The game sessions have already started!".to_string());
        assert_eq!(
            rendered,
            Some(("ops".to_string(), expected.render("U1")))
        );
    }

    #[tokio::test]
    async fn test_send_failures_are_counted_not_raised() {
        let outbound = MockChatOutbound::new();
        outbound.set_failing(true);
        let (relay, stats) = relay_with(&outbound);

        relay
            .relay(&RelayEvent::SessionError {
                name: "A".to_string(),
                message: "bad packet".to_string(),
            })
            .await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.relay_failures, 1);
        assert_eq!(snapshot.events_relayed, 0);
    }

    #[tokio::test]
    async fn test_without_log_channel_session_events_are_dropped() {
        let outbound = MockChatOutbound::new();
        let relay = EventRelay::new(
            Arc::new(outbound.clone()),
            None,
            Arc::new(RelayStats::new()),
        );

        relay
            .relay(&RelayEvent::SessionReady {
                name: "A".to_string(),
            })
            .await;
        relay.relay(&RelayEvent::ShutdownRequested).await;

        assert!(outbound.sent().is_empty());
    }
}
