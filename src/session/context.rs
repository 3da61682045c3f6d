//! Process-wide relay state, built once and shared by reference

use std::sync::Arc;

use super::action_channel::ActionChannel;
use super::focus::ControlFocus;
use super::lifecycle::SessionLifecycle;
use super::registry::SessionRegistry;
use crate::config::TimingConfig;
use crate::transport::GameTransport;

/// Registry, focus and lifecycle wired to the same session set
pub struct RelayContext {
    pub registry: Arc<SessionRegistry>,
    pub focus: ControlFocus,
    pub lifecycle: SessionLifecycle,
}

impl RelayContext {
    pub fn new(
        transport: Arc<dyn GameTransport>,
        events: ActionChannel,
        timing: TimingConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        Arc::new(Self {
            focus: ControlFocus::new(registry.clone()),
            lifecycle: SessionLifecycle::new(registry.clone(), transport, events, timing),
            registry,
        })
    }
}
