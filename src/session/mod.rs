//! Game session management module
//!
//! This module provides the core components for running the relayed game sessions,
//! including the registry, bring-up lifecycle, control focus, command dispatch and
//! the manager loop that ties them together.

pub mod action_channel;
pub mod command_router;
pub mod context;
pub mod focus;
pub mod lifecycle;
pub mod registry;
pub mod session_manager;
pub mod types;

pub use action_channel::{ActionChannel, RelayEvent, ReplyTarget};
pub use command_router::{Command, CommandDispatcher, CommandKind, DispatchOutcome, Reply, SideEffect};
pub use context::RelayContext;
pub use focus::{ControlFocus, FocusAction};
pub use lifecycle::{BringUpReport, SessionLifecycle, StartOutcome, SweepReport};
pub use registry::{Session, SessionRegistry};
pub use session_manager::{ManagerState, RelayManager};
pub use types::{RelayError, SessionState};
