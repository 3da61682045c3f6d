//! Named game sessions and the registry that owns them

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info};

use super::types::{RelayError, SessionState};
use crate::config::AccountConfig;
use crate::transport::GameHandle;

/// One game login, addressed by name
pub struct Session {
    name: String,
    account: AccountConfig,
    state: watch::Sender<SessionState>,
    handle: Mutex<Option<Box<dyn GameHandle>>>,
}

impl Session {
    fn new(name: String, account: AccountConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            name,
            account,
            state,
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Move to `next`; Ended is final. Returns whether the state changed.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == SessionState::Ended || *current == next {
                return false;
            }
            debug!("Session {} {} -> {}", self.name, current, next);
            *current = next;
            true
        })
    }

    /// Install the live connection handle
    pub(crate) async fn attach(&self, handle: Box<dyn GameHandle>) {
        *self.handle.lock().await = Some(handle);
    }

    /// Send a chat line through this session
    pub async fn chat(&self, text: &str) -> Result<(), RelayError> {
        let not_connected = || RelayError::NotConnected {
            name: self.name.clone(),
        };

        if self.state() == SessionState::Ended {
            return Err(not_connected());
        }

        let guard = self.handle.lock().await;
        let handle = guard.as_ref().ok_or_else(not_connected)?;
        handle.chat(text).await?;
        Ok(())
    }

    /// Drop the connection, asking the server to let us go first
    pub(crate) async fn close(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.quit().await;
        }
        self.transition(SessionState::Ended);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns every session; iteration follows creation order
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in `Connecting` state
    pub async fn create(
        &self,
        name: impl Into<String>,
        account: AccountConfig,
    ) -> Result<Arc<Session>, RelayError> {
        let name = name.into();
        let mut sessions = self.sessions.write().await;

        if sessions.iter().any(|session| session.name == name) {
            return Err(RelayError::DuplicateSession(name));
        }

        let session = Arc::new(Session::new(name.clone(), account));
        sessions.push(session.clone());
        info!("Registered session: {}", name);
        Ok(session)
    }

    /// Look up a session by name
    pub async fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|session| session.name == name)
            .cloned()
    }

    /// Snapshot of all sessions in creation order
    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.clone()
    }

    /// Session names in creation order
    pub async fn names(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|session| session.name.clone())
            .collect()
    }

    /// Forget a session; no-op when the name is unknown
    pub async fn remove(&self, name: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let index = sessions.iter().position(|session| session.name == name)?;
        let session = sessions.remove(index);
        info!("Removed session: {}", name);
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
