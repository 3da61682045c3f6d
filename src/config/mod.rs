//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::session::RelayError;

const REDACTED: &str = "********";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Prefix that marks a chat message as a command
    pub command_prefix: String,

    /// Sender ids allowed to issue commands
    pub controllers: Vec<String>,

    /// Chat line sent by `join` and `join_all`
    pub join_command: String,

    /// Game accounts brought up by `start_all`, in order
    pub accounts: Vec<AccountConfig>,

    /// Throttling delays
    pub timing: TimingConfig,

    /// Chat gateway configuration
    pub chat: ChatConfig,

    /// Game gateway configuration
    pub game: GameConfig,

    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountConfig {
    /// Player name; doubles as the session name
    pub username: String,

    /// Login email for online auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Login password for online auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Auth flavour: offline, mojang or microsoft
    #[serde(default = "default_auth")]
    pub auth: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between consecutive logins during bring-up
    pub session_delay_ms: u64,

    /// Pause between consecutive sessions during a join sweep
    pub join_delay_ms: u64,

    /// Grace period for the stop reply to go out before exiting
    pub stop_flush_ms: u64,

    /// Settle time between login confirmation and marking a session ready
    pub ready_settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat gateway WebSocket URL
    pub gateway_url: String,

    /// Bot token sent on identify
    pub token: String,

    /// Channel that receives relayed game events
    pub log_channel_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    /// Game gateway WebSocket URL
    pub server_url: String,

    /// Protocol version to request; server default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level
    pub level: String,

    /// Absolute or relative path to the log file
    pub file_path: String,
}

fn default_auth() -> String {
    "offline".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            controllers: Vec::new(),
            join_command: "/server survival".to_string(),
            accounts: Vec::new(),
            timing: TimingConfig::default(),
            chat: ChatConfig::default(),
            game: GameConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            session_delay_ms: 2500,
            join_delay_ms: 1500,
            stop_flush_ms: 1000,
            ready_settle_ms: 1250,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://127.0.0.1:4200/v1/gateway".to_string(),
            token: String::new(),
            log_channel_id: String::new(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:4100/v1/json".to_string(),
            version: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: "logs/craftrelay.log".to_string(),
        }
    }
}

impl AccountConfig {
    /// Offline account with just a username
    pub fn offline(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            password: None,
            auth: default_auth(),
        }
    }

    /// Check the account can be used for a login attempt
    pub fn validate(&self) -> Result<(), RelayError> {
        let malformed = |reason: &str| RelayError::MalformedAccount {
            name: self.username.clone(),
            reason: reason.to_string(),
        };

        if self.username.trim().is_empty() {
            return Err(malformed("username must not be empty"));
        }
        if self.username.chars().any(char::is_whitespace) {
            return Err(malformed("username must not contain whitespace"));
        }

        match self.auth.as_str() {
            "offline" => Ok(()),
            "mojang" | "microsoft" => {
                let has = |field: &Option<String>| {
                    field.as_deref().is_some_and(|value| !value.trim().is_empty())
                };
                if !has(&self.email) {
                    return Err(malformed("online auth requires an email"));
                }
                if !has(&self.password) {
                    return Err(malformed("online auth requires a password"));
                }
                Ok(())
            }
            other => Err(malformed(&format!("unknown auth type: {}", other))),
        }
    }
}

impl TimingConfig {
    pub fn session_delay(&self) -> Duration {
        Duration::from_millis(self.session_delay_ms)
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_ms)
    }

    pub fn stop_flush(&self) -> Duration {
        Duration::from_millis(self.stop_flush_ms)
    }

    pub fn ready_settle(&self) -> Duration {
        Duration::from_millis(self.ready_settle_ms)
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let millis = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());

        // CRAFTRELAY_COMMAND_PREFIX - command prefix
        if let Some(prefix) = non_empty("CRAFTRELAY_COMMAND_PREFIX") {
            self.command_prefix = prefix.trim().to_string();
        }

        // CRAFTRELAY_CONTROLLERS - comma-separated list of sender ids
        if let Some(controllers) = lookup("CRAFTRELAY_CONTROLLERS") {
            self.controllers = controllers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // CRAFTRELAY_JOIN_COMMAND - chat line used by join/join_all
        if let Some(join_command) = non_empty("CRAFTRELAY_JOIN_COMMAND") {
            self.join_command = join_command;
        }

        // Chat gateway environment variables
        if let Some(url) = non_empty("CRAFTRELAY_CHAT_GATEWAY_URL") {
            self.chat.gateway_url = url;
        }
        if let Some(token) = non_empty("CRAFTRELAY_CHAT_TOKEN") {
            self.chat.token = token;
        }
        if let Some(channel) = non_empty("CRAFTRELAY_CHAT_LOG_CHANNEL_ID") {
            self.chat.log_channel_id = channel;
        }

        // Game gateway environment variables
        if let Some(url) = non_empty("CRAFTRELAY_GAME_SERVER_URL") {
            self.game.server_url = url;
        }
        if let Some(version) = non_empty("CRAFTRELAY_GAME_VERSION") {
            self.game.version = Some(version);
        }

        // Logging environment variables
        if let Some(level) = non_empty("CRAFTRELAY_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(file_path) = non_empty("CRAFTRELAY_LOG_FILE_PATH") {
            self.log.file_path = file_path;
        }

        // Timing environment variables
        if let Some(value) = millis("CRAFTRELAY_SESSION_DELAY_MS") {
            self.timing.session_delay_ms = value;
        }
        if let Some(value) = millis("CRAFTRELAY_JOIN_DELAY_MS") {
            self.timing.join_delay_ms = value;
        }
        if let Some(value) = millis("CRAFTRELAY_STOP_FLUSH_MS") {
            self.timing.stop_flush_ms = value;
        }
        if let Some(value) = millis("CRAFTRELAY_READY_SETTLE_MS") {
            self.timing.ready_settle_ms = value;
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration, using defaults only when the file does not exist
    ///
    /// A file that exists but cannot be read, parsed or validated is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load_from_file(path);
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Accounts are checked one by one during bring-up instead, so that a
    /// single bad entry does not keep the others from logging in.
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Command prefix must not contain whitespace");
        }

        if self.join_command.trim().is_empty() {
            anyhow::bail!("Join command must not be empty");
        }

        if self.chat.gateway_url.trim().is_empty() {
            anyhow::bail!("chat.gateway_url must not be empty");
        }

        if self.game.server_url.trim().is_empty() {
            anyhow::bail!("game.server_url must not be empty");
        }

        if self.timing.session_delay_ms == 0 || self.timing.join_delay_ms == 0 {
            anyhow::bail!("Session and join delays must be greater than 0");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        Ok(())
    }

    /// Problems that do not stop the relay but leave parts of it unusable
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.controllers.is_empty() {
            warnings.push("No controllers configured; every command will be refused".to_string());
        }
        for account in &self.accounts {
            if let Err(e) = account.validate() {
                warnings.push(format!("{}; it will be skipped by start_all", e));
            }
        }
        warnings
    }

    /// Copy with secrets blanked out, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.chat.token.is_empty() {
            config.chat.token = REDACTED.to_string();
        }
        for account in &mut config.accounts {
            if account.password.is_some() {
                account.password = Some(REDACTED.to_string());
            }
        }
        config
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.redacted())
            .context("Failed to serialize configuration")?;
        println!("{}", "Current configuration:".bold());
        println!("{}", content);
        Ok(())
    }

    /// Display configuration summary
    pub fn display_summary(&self) -> Result<()> {
        println!("{}", "Configuration loaded successfully".green());
        println!("  Command prefix: {}", self.command_prefix);
        println!("  Controllers:    {}", self.controllers.len());
        println!("  Accounts:       {}", self.accounts.len());
        println!("  Chat gateway:   {}", self.chat.gateway_url);
        println!("  Game gateway:   {}", self.game.server_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.timing.session_delay(), Duration::from_millis(2500));
        assert_eq!(config.timing.join_delay(), Duration::from_millis(1500));
        assert_eq!(config.timing.stop_flush(), Duration::from_millis(1000));
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.controllers = vec!["U1".to_string()];
        config.accounts = vec![AccountConfig::offline("Alpha"), AccountConfig::offline("Beta")];
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.accounts, config.accounts);
        assert_eq!(loaded_config.controllers, vec!["U1"]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let loaded: Config = toml::from_str(
            r#"
            controllers = ["U1"]

            [[accounts]]
            username = "Alpha"

            [timing]
            session_delay_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(loaded.accounts[0].auth, "offline");
        assert_eq!(loaded.timing.session_delay_ms, 10);
        assert_eq!(loaded.timing.join_delay_ms, 1500);
        assert_eq!(loaded.command_prefix, "!");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CRAFTRELAY_CONTROLLERS", " U1, ,U2 "),
            ("CRAFTRELAY_COMMAND_PREFIX", "?"),
            ("CRAFTRELAY_SESSION_DELAY_MS", "100"),
            ("CRAFTRELAY_JOIN_DELAY_MS", "not-a-number"),
            ("CRAFTRELAY_CHAT_TOKEN", "   "),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.controllers, vec!["U1", "U2"]);
        assert_eq!(config.command_prefix, "?");
        assert_eq!(config.timing.session_delay_ms, 100);
        assert_eq!(config.timing.join_delay_ms, 1500);
        assert!(config.chat.token.is_empty());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let mut config = Config::default();
        config.command_prefix = "! ".to_string();
        assert!(config.validate().is_err());
        config.command_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_account_validation() {
        assert!(AccountConfig::offline("Steve").validate().is_ok());
        assert!(AccountConfig::offline("").validate().is_err());
        assert!(AccountConfig::offline("two words").validate().is_err());

        let mut online = AccountConfig::offline("Alex");
        online.auth = "microsoft".to_string();
        assert!(matches!(
            online.validate(),
            Err(RelayError::MalformedAccount { .. })
        ));
        online.email = Some("alex@example.com".to_string());
        online.password = Some("hunter2".to_string());
        assert!(online.validate().is_ok());

        let mut unknown = AccountConfig::offline("Zed");
        unknown.auth = "ldap".to_string();
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn test_load_or_default_reports_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"controllers = ["U1""#).unwrap();
        assert!(Config::load_or_default(file.path()).is_err());

        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.command_prefix, "!");
    }

    #[test]
    fn test_warnings_name_unusable_parts() {
        let mut config = Config::default();
        config.accounts = vec![AccountConfig::offline("Alpha"), AccountConfig::offline("")];
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("No controllers configured"));

        config.controllers = vec!["U1".to_string()];
        config.accounts.pop();
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Config::default();
        config.chat.token = "secret-token".to_string();
        let mut account = AccountConfig::offline("Alex");
        account.password = Some("hunter2".to_string());
        config.accounts.push(account);

        let redacted = config.redacted();
        assert_eq!(redacted.chat.token, REDACTED);
        assert_eq!(redacted.accounts[0].password.as_deref(), Some(REDACTED));
        assert_eq!(config.chat.token, "secret-token");
    }
}
