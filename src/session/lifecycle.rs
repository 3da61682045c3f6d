//! Sequential, throttled bring-up of the configured game sessions

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use super::action_channel::{ActionChannel, RelayEvent};
use super::registry::{Session, SessionRegistry};
use super::types::{RelayError, SessionState};
use crate::config::{AccountConfig, TimingConfig};
use crate::metrics;
use crate::transport::{GameConnection, GameEvent, GameTransport};

/// Result of one completed bring-up run
#[derive(Debug, Clone, PartialEq)]
pub struct BringUpReport {
    pub total: usize,
    pub started: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub elapsed: Duration,
}

/// What `start_all` ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Completed(BringUpReport),
    AlreadyStarted,
}

/// Result of a join sweep over all sessions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Exclusive right to run one bring-up; releases the slot when dropped
#[derive(Debug)]
pub struct BringUpTicket {
    starting: Arc<AtomicBool>,
}

impl Drop for BringUpTicket {
    fn drop(&mut self) {
        self.starting.store(false, Ordering::SeqCst);
    }
}

pub struct SessionLifecycle {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn GameTransport>,
    events: ActionChannel,
    timing: TimingConfig,
    starting: Arc<AtomicBool>,
    gate: AtomicBool,
}

impl SessionLifecycle {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn GameTransport>,
        events: ActionChannel,
        timing: TimingConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            events,
            timing,
            starting: Arc::new(AtomicBool::new(false)),
            gate: AtomicBool::new(false),
        }
    }

    /// Whether bring-up has completed (possibly with failed accounts)
    pub fn is_ready(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    /// Whether a bring-up run is in flight
    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    /// Claim the bring-up slot without waiting
    ///
    /// Fails with `AlreadyStarted` once the gate is open and with
    /// `AlreadyStarting` while another ticket is alive.
    pub fn try_begin(&self) -> Result<BringUpTicket, RelayError> {
        if self.is_ready() {
            debug!("Bring-up requested but sessions already started");
            return Err(RelayError::AlreadyStarted);
        }

        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Bring-up requested while another bring-up is in progress");
            return Err(RelayError::AlreadyStarting);
        }

        let ticket = BringUpTicket {
            starting: self.starting.clone(),
        };

        // A run may have completed between the gate check and the claim.
        if self.is_ready() {
            return Err(RelayError::AlreadyStarted);
        }

        Ok(ticket)
    }

    /// Claim the slot and run bring-up to completion
    pub async fn start_all(&self, accounts: &[AccountConfig]) -> Result<StartOutcome, RelayError> {
        match self.try_begin() {
            Ok(ticket) => Ok(StartOutcome::Completed(
                self.run_bring_up(ticket, accounts).await,
            )),
            Err(RelayError::AlreadyStarted) => Ok(StartOutcome::AlreadyStarted),
            Err(e) => Err(e),
        }
    }

    /// Log in every account in order, pausing `session_delay` between logins
    ///
    /// Individual account failures are logged and skipped; the gate opens at
    /// the end either way, before `ticket` frees the slot.
    pub async fn run_bring_up(
        &self,
        ticket: BringUpTicket,
        accounts: &[AccountConfig],
    ) -> BringUpReport {
        info!("Starting bring-up of {} sessions", accounts.len());
        let started_at = Instant::now();
        let mut report = BringUpReport {
            total: accounts.len(),
            started: Vec::new(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
        };

        for (index, account) in accounts.iter().enumerate() {
            if index > 0 {
                sleep(self.timing.session_delay()).await;
            }

            match self.start_session(account).await {
                Ok(name) => {
                    metrics::record_session_start(true);
                    report.started.push(name);
                }
                Err(e) => {
                    error!("Failed to start session {}: {}", account.username, e);
                    metrics::record_session_start(false);
                    report.failed.push((account.username.clone(), e.to_string()));
                }
            }
        }

        report.elapsed = started_at.elapsed();
        self.gate.store(true, Ordering::SeqCst);
        drop(ticket);

        info!(
            "Bring-up completed: {}/{} sessions started in {:?}",
            report.started.len(),
            report.total,
            report.elapsed
        );
        report
    }

    /// Register, connect and start pumping events for one account
    async fn start_session(&self, account: &AccountConfig) -> Result<String, RelayError> {
        account.validate()?;

        let session = self
            .registry
            .create(account.username.clone(), account.clone())
            .await?;

        match self.transport.connect(account).await {
            Ok(GameConnection { handle, events }) => {
                session.attach(handle).await;
                tokio::spawn(pump_events(
                    session.clone(),
                    events,
                    self.registry.clone(),
                    self.events.clone(),
                    self.timing.ready_settle(),
                ));
                info!("Session {} connected, waiting for login", session.name());
                Ok(session.name().to_string())
            }
            Err(e) => {
                session.close().await;
                self.registry.remove(session.name()).await;
                Err(e.into())
            }
        }
    }

    /// Send `line` from every session in creation order, pausing `join_delay` between them
    pub async fn join_all(&self, line: &str) -> SweepReport {
        let sessions = self.registry.all().await;
        let mut report = SweepReport::default();

        info!("Sending {:?} from {} sessions", line, sessions.len());
        for (index, session) in sessions.iter().enumerate() {
            if index > 0 {
                sleep(self.timing.join_delay()).await;
            }

            match session.chat(line).await {
                Ok(()) => report.delivered.push(session.name().to_string()),
                Err(e) => {
                    warn!("Failed to send join command from {}: {}", session.name(), e);
                    report.failed.push((session.name().to_string(), e.to_string()));
                }
            }
        }

        report
    }

    /// Ask every live session to leave
    pub async fn shutdown_all(&self) {
        for session in self.registry.all().await {
            info!("Closing session {}", session.name());
            session.close().await;
        }
    }
}

/// Mark the session ready once the settle delay passes, unless it ended meanwhile
async fn settle_ready(session: Arc<Session>, channel: ActionChannel, ready_settle: Duration) {
    sleep(ready_settle).await;
    if !session.transition(SessionState::Ready) {
        return;
    }

    info!("Session {} is ready", session.name());
    let event = RelayEvent::SessionReady {
        name: session.name().to_string(),
    };
    if let Err(e) = channel.send_event(event) {
        debug!("Dropping ready event for {}: {}", session.name(), e);
    }
}

/// Forward one session's game events until it ends, then unregister it
async fn pump_events(
    session: Arc<Session>,
    mut events: mpsc::UnboundedReceiver<GameEvent>,
    registry: Arc<SessionRegistry>,
    channel: ActionChannel,
    ready_settle: Duration,
) {
    let name = session.name().to_string();

    let reason = loop {
        let Some(event) = events.recv().await else {
            break "event stream closed".to_string();
        };

        let relay = match event {
            GameEvent::LoggedIn => {
                tokio::spawn(settle_ready(
                    session.clone(),
                    channel.clone(),
                    ready_settle,
                ));
                continue;
            }
            GameEvent::Chat { text, extra } => RelayEvent::GameChat {
                name: name.clone(),
                text,
                extra,
            },
            GameEvent::ProtocolError { message } => {
                error!("Protocol error on session {}: {}", name, message);
                RelayEvent::SessionError {
                    name: name.clone(),
                    message,
                }
            }
            GameEvent::Kicked { reason } => {
                warn!("Session {} was kicked: {}", name, reason);
                break format!("kicked: {}", reason);
            }
            GameEvent::Ended { reason } => break reason,
        };

        if let Err(e) = channel.send_event(relay) {
            debug!("Dropping event for {}: {}", name, e);
        }
    };

    session.close().await;
    registry.remove(&name).await;
    info!("Session {} ended: {}", name, reason);

    if let Err(e) = channel.send_event(RelayEvent::SessionEnded { name, reason }) {
        debug!("Dropping end event: {}", e);
    }
}
