//! The single "currently controlled" session
//!
//! Only the session name is stored. Every use re-resolves it against the
//! registry, so a session that ended in the meantime simply stops resolving.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::registry::SessionRegistry;
use super::types::RelayError;

/// Action performed against the focused session
#[derive(Debug, Clone, PartialEq)]
pub enum FocusAction {
    /// Send the configured join command
    Join(String),
    /// Accept a pending teleport request
    TpYes,
    /// Say something verbatim
    Chat(String),
}

impl FocusAction {
    /// Chat line the action translates to
    pub fn line(&self) -> &str {
        match self {
            FocusAction::Join(command) => command,
            FocusAction::TpYes => "/tpyes",
            FocusAction::Chat(text) => text,
        }
    }
}

pub struct ControlFocus {
    registry: Arc<SessionRegistry>,
    current: Mutex<Option<String>>,
}

impl ControlFocus {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            current: Mutex::new(None),
        }
    }

    /// Point the focus at `name` if such a session exists
    ///
    /// On failure the focus is left alone and the error carries it as `retained`.
    pub async fn set_focus(&self, name: &str) -> Result<String, RelayError> {
        let mut current = self.current.lock().await;

        match self.registry.get(name).await {
            Some(session) => {
                let name = session.name().to_string();
                info!("Control focus moved to {}", name);
                *current = Some(name.clone());
                Ok(name)
            }
            None => {
                debug!("Control focus target not found: {}", name);
                Err(RelayError::NotFound {
                    requested: name.to_string(),
                    retained: current.clone(),
                })
            }
        }
    }

    /// Stored focus, without checking it still resolves
    pub async fn current_focus(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    /// Run `action` against the focused session, resolved right now
    ///
    /// Returns the name of the session that received the action.
    pub async fn dispatch_to_focus(&self, action: &FocusAction) -> Result<String, RelayError> {
        let focused = self.current_focus().await;
        let Some(name) = focused.as_deref() else {
            return Err(RelayError::NoActiveSession { focused: None });
        };

        let Some(session) = self.registry.get(name).await else {
            debug!("Focused session {} no longer resolves", name);
            return Err(RelayError::NoActiveSession {
                focused: focused.clone(),
            });
        };

        session.chat(action.line()).await?;
        debug!("Sent {:?} to focused session {}", action, name);
        Ok(session.name().to_string())
    }
}
