//! Command Router for operator chat commands

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::context::RelayContext;
use super::focus::FocusAction;
use super::lifecycle::BringUpTicket;
use super::types::RelayError;
use crate::config::Config;
use crate::metrics::{self, RelayStats};
use crate::transport::InboundMessage;

/// Parsed operator command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Lower-cased command name without the prefix
    pub name: String,
    /// Remaining tokens, original casing
    pub args: Vec<String>,
}

impl Command {
    /// Parse `raw` if it starts with `prefix`
    pub fn parse(raw: &str, prefix: &str) -> Option<Self> {
        if !raw.starts_with(prefix) {
            return None;
        }

        let mut tokens = raw.split_whitespace();
        let first = tokens.next()?;
        let name = first
            .get(prefix.len()..)
            .unwrap_or_default()
            .to_lowercase();

        Some(Self {
            name,
            args: tokens.map(str::to_string).collect(),
        })
    }

    /// Arguments joined back with single spaces
    pub fn joined_args(&self) -> String {
        self.args.join(" ")
    }
}

/// The closed set of operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    StartAll,
    StopAll,
    JoinAll,
    Control,
    Join,
    TpYes,
    Chat,
}

impl CommandKind {
    pub const ALL: [CommandKind; 8] = [
        CommandKind::Help,
        CommandKind::StartAll,
        CommandKind::StopAll,
        CommandKind::JoinAll,
        CommandKind::Control,
        CommandKind::Join,
        CommandKind::TpYes,
        CommandKind::Chat,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Help => "help",
            CommandKind::StartAll => "start_all",
            CommandKind::StopAll => "stop_all",
            CommandKind::JoinAll => "join_all",
            CommandKind::Control => "control",
            CommandKind::Join => "join",
            CommandKind::TpYes => "tpyes",
            CommandKind::Chat => "chat",
        }
    }

    /// Whether the command needs bring-up to have completed
    fn requires_gate(self) -> bool {
        !matches!(
            self,
            CommandKind::Help | CommandKind::StartAll | CommandKind::StopAll
        )
    }

    /// Whether the command acts on the focused session
    fn requires_focus(self) -> bool {
        matches!(
            self,
            CommandKind::Join | CommandKind::TpYes | CommandKind::Chat
        )
    }
}

/// Outward reply text
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Addressed to the sender
    Mention(String),
    /// Posted to the channel as is
    Channel(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Mention(text) | Reply::Channel(text) => text,
        }
    }

    /// Final text for a sender in the origin channel
    pub fn render(&self, sender_id: &str) -> String {
        match self {
            Reply::Mention(text) => format!("<@{}> {}", sender_id, text),
            Reply::Channel(text) => text.clone(),
        }
    }
}

/// Deferred work a command asks the caller to run
#[derive(Debug)]
pub enum SideEffect {
    None,
    /// Run bring-up in the background with the already claimed slot, then report
    StartAll(BringUpTicket),
    /// Run the join sweep in the background, then report
    JoinSweep,
    /// Exit the process once the reply is out
    Terminate,
}

/// Structured result of handling one command
#[derive(Debug)]
pub struct DispatchOutcome {
    pub reply: Option<Reply>,
    pub effect: SideEffect,
}

impl DispatchOutcome {
    fn mention(text: impl Into<String>) -> Self {
        Self {
            reply: Some(Reply::Mention(text.into())),
            effect: SideEffect::None,
        }
    }

    fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effect = effect;
        self
    }
}

/// Authorizes senders and turns commands into actions against the relay context
pub struct CommandDispatcher {
    context: Arc<RelayContext>,
    controllers: HashSet<String>,
    prefix: String,
    join_command: String,
    stats: Arc<RelayStats>,
}

impl CommandDispatcher {
    pub fn new(context: Arc<RelayContext>, config: &Config) -> Self {
        Self::with_stats(context, config, Arc::new(RelayStats::new()))
    }

    pub fn with_stats(context: Arc<RelayContext>, config: &Config, stats: Arc<RelayStats>) -> Self {
        Self {
            context,
            controllers: config.controllers.iter().cloned().collect(),
            prefix: config.command_prefix.clone(),
            join_command: config.join_command.clone(),
            stats,
        }
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    /// Allow-list membership
    pub fn authorize(&self, sender_id: &str) -> bool {
        self.controllers.contains(sender_id)
    }

    /// Allow-list membership as a `Result`
    pub fn check_sender(&self, sender_id: &str) -> Result<(), RelayError> {
        if self.authorize(sender_id) {
            Ok(())
        } else {
            Err(RelayError::Unauthorized(sender_id.to_string()))
        }
    }

    /// Parse with the configured prefix
    pub fn parse(&self, raw: &str) -> Option<Command> {
        Command::parse(raw, &self.prefix)
    }

    /// Full inbound path: filter, parse, authorize, dispatch
    ///
    /// Returns `None` for messages that are not commands for us.
    pub async fn handle(&self, message: &InboundMessage) -> Option<DispatchOutcome> {
        if message.sender_is_bot {
            return None;
        }

        let command = self.parse(&message.text)?;

        if let Err(e) = self.check_sender(&message.sender_id) {
            warn!("Refusing command {:?}: {}", command.name, e);
            self.stats.command_refused();
            return Some(DispatchOutcome::mention("You aren't allowed to use me!"));
        }

        self.stats.command_processed();
        Some(self.dispatch(&command).await)
    }

    /// Run an already authorized command
    pub async fn dispatch(&self, command: &Command) -> DispatchOutcome {
        let Some(kind) = CommandKind::from_name(&command.name) else {
            debug!("Unknown command: {:?}", command.name);
            return DispatchOutcome::mention(format!(
                "That isn't a valid command!\nSend `{}help` for help!",
                self.prefix
            ));
        };

        info!("Dispatching command {} {:?}", kind.name(), command.args);
        metrics::record_command(kind.name());

        if kind.requires_gate() && !self.context.lifecycle.is_ready() {
            return DispatchOutcome::mention(format!(
                "The game sessions need to be started!\nDo `{}start_all` to start them!",
                self.prefix
            ));
        }

        if kind.requires_focus() && self.context.focus.current_focus().await.is_none() {
            return DispatchOutcome::mention(format!(
                "No session is being controlled!\nDo `{}control <name>` to pick one!",
                self.prefix
            ));
        }

        match kind {
            CommandKind::Help => self.help(),
            CommandKind::StartAll => self.start_all(),
            CommandKind::StopAll => self.stop_all(),
            CommandKind::JoinAll => DispatchOutcome {
                reply: None,
                effect: SideEffect::JoinSweep,
            },
            CommandKind::Control => self.control(command).await,
            CommandKind::Join => {
                self.send_to_focus(FocusAction::Join(self.join_command.clone()))
                    .await
            }
            CommandKind::TpYes => self.send_to_focus(FocusAction::TpYes).await,
            CommandKind::Chat => {
                let text = command.joined_args();
                let text = text.trim();
                if text.is_empty() {
                    return DispatchOutcome::mention(
                        "Try sending something after the command next time!",
                    );
                }
                self.send_to_focus(FocusAction::Chat(text.to_string()))
                    .await
            }
        }
    }

    fn help(&self) -> DispatchOutcome {
        let listing = CommandKind::ALL
            .iter()
            .map(|kind| format!("`{}`", kind.name()))
            .collect::<Vec<_>>()
            .join(", ");
        DispatchOutcome {
            reply: Some(Reply::Channel(format!("Available Commands: {}", listing))),
            effect: SideEffect::None,
        }
    }

    fn start_all(&self) -> DispatchOutcome {
        match self.context.lifecycle.try_begin() {
            Ok(ticket) => DispatchOutcome::mention("Starting the game sessions!")
                .with_effect(SideEffect::StartAll(ticket)),
            Err(RelayError::AlreadyStarting) => {
                DispatchOutcome::mention("The game sessions are already starting, hang tight!")
            }
            Err(_) => DispatchOutcome::mention("The game sessions have already started!"),
        }
    }

    fn stop_all(&self) -> DispatchOutcome {
        DispatchOutcome::mention(format!(
            "I am going to stop everything now!\nWait a few seconds then do `{}start_all` to start me!",
            self.prefix
        ))
        .with_effect(SideEffect::Terminate)
    }

    async fn control(&self, command: &Command) -> DispatchOutcome {
        let focus = &self.context.focus;

        if command.args.is_empty() {
            return match focus.current_focus().await {
                Some(name) => DispatchOutcome::mention(format!("Currently controlling `{}`.", name)),
                None => DispatchOutcome::mention(format!(
                    "Not controlling any session.\nDo `{}control <name>` to pick one!",
                    self.prefix
                )),
            };
        }

        match focus.set_focus(&command.joined_args()).await {
            Ok(name) => DispatchOutcome::mention(format!("Now controlling `{}`!", name)),
            Err(RelayError::NotFound {
                requested,
                retained,
            }) => {
                let staying = match retained {
                    Some(name) => format!("staying on `{}`", name),
                    None => "no session is being controlled".to_string(),
                };
                DispatchOutcome::mention(format!(
                    "Couldn't find a session named `{}`, {}.",
                    requested, staying
                ))
            }
            Err(e) => DispatchOutcome::mention(format!("Couldn't switch control: {}", e)),
        }
    }

    async fn send_to_focus(&self, action: FocusAction) -> DispatchOutcome {
        match self.context.focus.dispatch_to_focus(&action).await {
            Ok(_) => match action {
                FocusAction::Chat(_) => DispatchOutcome::mention("I sent the message to the game!"),
                FocusAction::Join(_) | FocusAction::TpYes => {
                    DispatchOutcome::mention("I sent the command to the game!")
                }
            },
            Err(RelayError::NoActiveSession { focused }) => {
                let name = focused.unwrap_or_default();
                DispatchOutcome::mention(format!(
                    "The controlled session `{}` is no longer connected!\nDo `{}control <name>` to pick another!",
                    name, self.prefix
                ))
            }
            Err(RelayError::NotConnected { name }) => DispatchOutcome::mention(format!(
                "`{}` isn't connected yet, try again in a moment!",
                name
            )),
            Err(e) => {
                warn!("Failed to send {:?} to focused session: {}", action, e);
                DispatchOutcome::mention(format!("I couldn't reach the game: {}", e))
            }
        }
    }
}
