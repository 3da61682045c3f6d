//! Mock implementations for chat and game transports
//! Used for testing without a chat gateway or game server

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::types::{GameEvent, TransportError};
use super::{ChatOutbound, GameConnection, GameHandle, GameTransport};
use crate::config::AccountConfig;

#[derive(Default)]
struct MockGameState {
    sent: Mutex<Vec<(String, String)>>,
    connects: Mutex<Vec<(String, Instant)>>,
    quits: Mutex<Vec<String>>,
    event_senders: Mutex<HashMap<String, mpsc::UnboundedSender<GameEvent>>>,
    failing_connects: Mutex<HashSet<String>>,
    failing_sends: Mutex<HashSet<String>>,
    manual_login: AtomicBool,
}

/// In-memory game transport that records every chat line
#[derive(Clone, Default)]
pub struct MockGameTransport {
    state: Arc<MockGameState>,
}

impl MockGameTransport {
    /// Create a transport whose connections log in immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose connections wait for an explicit `LoggedIn` event
    pub fn with_manual_login() -> Self {
        let transport = Self::default();
        transport.state.manual_login.store(true, Ordering::SeqCst);
        transport
    }

    /// Make `connect` fail for the given account name
    pub fn fail_connect(&self, name: impl Into<String>) {
        self.state.failing_connects.lock().unwrap().insert(name.into());
    }

    /// Make chat sends fail for the given account name
    pub fn fail_sends(&self, name: impl Into<String>) {
        self.state.failing_sends.lock().unwrap().insert(name.into());
    }

    /// Inject an event into the named connection; false if it was never opened or is gone
    pub fn emit(&self, name: &str, event: GameEvent) -> bool {
        self.state
            .event_senders
            .lock()
            .unwrap()
            .get(name)
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    /// Every chat line sent so far as `(session, text)`
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.sent.lock().unwrap().clone()
    }

    /// Chat lines sent by one session
    pub fn sent_by(&self, name: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(session, _)| session == name)
            .map(|(_, text)| text)
            .collect()
    }

    /// Connect attempts in call order with their (tokio) timestamps
    pub fn connects(&self) -> Vec<(String, Instant)> {
        self.state.connects.lock().unwrap().clone()
    }

    /// Names of sessions that were asked to quit
    pub fn quits(&self) -> Vec<String> {
        self.state.quits.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameTransport for MockGameTransport {
    async fn connect(&self, account: &AccountConfig) -> Result<GameConnection, TransportError> {
        let name = account.username.clone();
        self.state
            .connects
            .lock()
            .unwrap()
            .push((name.clone(), Instant::now()));

        if self.state.failing_connects.lock().unwrap().contains(&name) {
            return Err(TransportError::ConnectionError(format!(
                "mock connect refused for {}",
                name
            )));
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        if !self.state.manual_login.load(Ordering::SeqCst) {
            let _ = event_tx.send(GameEvent::LoggedIn);
        }
        self.state
            .event_senders
            .lock()
            .unwrap()
            .insert(name.clone(), event_tx);

        Ok(GameConnection {
            handle: Box::new(MockGameHandle {
                name,
                state: self.state.clone(),
            }),
            events,
        })
    }
}

struct MockGameHandle {
    name: String,
    state: Arc<MockGameState>,
}

#[async_trait]
impl GameHandle for MockGameHandle {
    async fn chat(&self, text: &str) -> Result<(), TransportError> {
        if self.state.failing_sends.lock().unwrap().contains(&self.name) {
            return Err(TransportError::SendError(format!(
                "mock send refused for {}",
                self.name
            )));
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((self.name.clone(), text.to_string()));
        Ok(())
    }

    async fn quit(&self) {
        self.state.quits.lock().unwrap().push(self.name.clone());
    }
}

/// Records outward chat messages instead of sending them
#[derive(Clone, Default)]
pub struct MockChatOutbound {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl MockChatOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle send failures
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every message sent so far as `(channel, text)`
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Message texts posted to one channel
    pub fn texts_in(&self, channel_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(channel, _)| channel == channel_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl ChatOutbound for MockChatOutbound {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::SendError("mock outbound refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}
