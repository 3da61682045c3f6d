//! End-to-end relay flows against in-memory transports

use std::sync::Arc;
use std::time::Duration;

use craftrelay::config::{AccountConfig, Config};
use craftrelay::session::{ManagerState, RelayManager};
use craftrelay::transport::mock::{MockChatOutbound, MockGameTransport};
use craftrelay::transport::{GameEvent, InboundMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

struct Harness {
    tx: mpsc::UnboundedSender<InboundMessage>,
    transport: MockGameTransport,
    outbound: MockChatOutbound,
    manager: JoinHandle<RelayManager>,
}

impl Harness {
    fn start(accounts: &[&str]) -> Self {
        let mut config = Config::default();
        config.controllers = vec!["U1".to_string()];
        config.accounts = accounts.iter().map(|n| AccountConfig::offline(*n)).collect();
        config.chat.log_channel_id = "log".to_string();

        let transport = MockGameTransport::new();
        let outbound = MockChatOutbound::new();
        let mut manager = RelayManager::new(
            config,
            Arc::new(transport.clone()),
            Arc::new(outbound.clone()),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let manager = tokio::spawn(async move {
            manager
                .run_until(rx, std::future::pending())
                .await
                .unwrap();
            manager
        });

        Self {
            tx,
            transport,
            outbound,
            manager,
        }
    }

    fn say(&self, sender: &str, text: &str) {
        self.tx
            .send(InboundMessage {
                message_id: format!("m-{}", text),
                channel_id: "ops".to_string(),
                sender_id: sender.to_string(),
                sender_is_bot: false,
                text: text.to_string(),
            })
            .unwrap();
    }

    fn ops(&self) -> Vec<String> {
        self.outbound.texts_in("ops")
    }

    async fn finish(self) -> (RelayManager, MockGameTransport, MockChatOutbound) {
        drop(self.tx);
        let manager = self.manager.await.unwrap();
        (manager, self.transport, self.outbound)
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_all_replies_twice_in_order() {
    let harness = Harness::start(&["A", "B"]);

    harness.say("U1", "!start_all");
    sleep(Duration::from_secs(10)).await;

    assert_eq!(
        harness.ops(),
        vec![
            "<@U1> Starting the game sessions!",
            "<@U1> All 2 game sessions have started!",
        ]
    );

    let log = harness.outbound.texts_in("log");
    assert!(log.contains(&"`A` logged in and is ready!".to_string()));
    assert!(log.contains(&"`B` logged in and is ready!".to_string()));

    let connects = harness.transport.connects();
    assert_eq!(connects.len(), 2);
    assert!(connects[1].1 - connects[0].1 >= Duration::from_millis(2500));

    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_during_bring_up_see_partial_state() {
    let harness = Harness::start(&["A", "B", "C"]);

    harness.say("U1", "!start_all");
    sleep(Duration::from_millis(100)).await;
    harness.say("U1", "!start_all");
    harness.say("U1", "!join");
    sleep(Duration::from_millis(100)).await;

    let ops = harness.ops();
    assert_eq!(ops[0], "<@U1> Starting the game sessions!");
    assert_eq!(
        ops[1],
        "<@U1> The game sessions are already starting, hang tight!"
    );
    assert!(ops[2].contains("need to be started"));
    assert_eq!(harness.transport.connects().len(), 1);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.connects().len(), 3);

    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_start_all_runs_once() {
    let harness = Harness::start(&["A", "B"]);

    harness.say("U1", "!start_all");
    harness.say("U1", "!start_all");
    sleep(Duration::from_secs(10)).await;

    assert_eq!(
        harness.ops(),
        vec![
            "<@U1> Starting the game sessions!",
            "<@U1> The game sessions are already starting, hang tight!",
            "<@U1> All 2 game sessions have started!",
        ]
    );
    assert_eq!(harness.transport.connects().len(), 2);

    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_operator_drives_focused_session() {
    let harness = Harness::start(&["A", "B"]);

    harness.say("U1", "!start_all");
    sleep(Duration::from_secs(10)).await;

    harness.say("U1", "!control B");
    harness.say("U1", "!chat hello there");
    harness.say("U1", "!tpyes");
    harness.say("U2", "!chat sneaky");
    sleep(Duration::from_millis(100)).await;

    let ops = harness.ops();
    assert_eq!(
        &ops[2..],
        &[
            "<@U1> Now controlling `B`!",
            "<@U1> I sent the message to the game!",
            "<@U1> I sent the command to the game!",
            "<@U2> You aren't allowed to use me!",
        ]
    );
    assert_eq!(harness.transport.sent_by("B"), vec!["hello there", "/tpyes"]);
    assert!(harness.transport.sent_by("A").is_empty());

    let (manager, _, _) = harness.finish().await;
    let snapshot = manager.stats().snapshot();
    assert_eq!(snapshot.commands_refused, 1);
    assert_eq!(snapshot.commands_processed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_join_all_reports_after_sweep() {
    let harness = Harness::start(&["A", "B", "C"]);

    harness.say("U1", "!start_all");
    sleep(Duration::from_secs(10)).await;

    let begin = Instant::now();
    harness.say("U1", "!join_all");
    sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.ops().len(), 2, "no reply until the sweep is done");

    sleep(Duration::from_secs(5)).await;
    assert_eq!(
        harness.ops().last().map(String::as_str),
        Some("<@U1> Sent the join command to 3 of 3 session(s)!")
    );
    assert!(begin.elapsed() >= Duration::from_millis(3000));

    let sent = harness.transport.sent();
    let senders: Vec<_> = sent.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(senders, vec!["A", "B", "C"]);
    assert!(sent.iter().all(|(_, line)| line == "/server survival"));

    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_kicked_focus_is_relayed_and_degrades() {
    let harness = Harness::start(&["A"]);

    harness.say("U1", "!start_all");
    sleep(Duration::from_secs(5)).await;
    harness.say("U1", "!control A");
    sleep(Duration::from_millis(100)).await;

    assert!(harness.transport.emit(
        "A",
        GameEvent::Chat {
            text: "§e<Bob> §fhi".to_string(),
            extra: vec![" all ".to_string()],
        }
    ));
    assert!(harness.transport.emit(
        "A",
        GameEvent::Kicked {
            reason: "afk".to_string()
        }
    ));
    sleep(Duration::from_millis(100)).await;

    let log = harness.outbound.texts_in("log");
    assert!(log.contains(&"[A] <Bob> hi all".to_string()));
    assert!(log.contains(&"`A` disconnected: kicked: afk".to_string()));

    harness.say("U1", "!chat anyone?");
    sleep(Duration::from_millis(100)).await;
    assert!(
        harness
            .ops()
            .last()
            .is_some_and(|text| text.contains("`A` is no longer connected"))
    );

    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_flushes_reply_then_exits() {
    let harness = Harness::start(&["A", "B"]);

    harness.say("U1", "!start_all");
    sleep(Duration::from_secs(10)).await;

    let begin = Instant::now();
    harness.say("U1", "!stop_all");
    let manager = harness.manager.await.unwrap();

    assert!(begin.elapsed() >= Duration::from_millis(1000));
    assert_eq!(manager.state(), ManagerState::Terminated);
    assert!(
        harness
            .outbound
            .texts_in("ops")
            .last()
            .is_some_and(|text| text.starts_with("<@U1> I am going to stop everything now!"))
    );

    let mut quits = harness.transport.quits();
    quits.sort();
    assert_eq!(quits, vec!["A", "B"]);
}
