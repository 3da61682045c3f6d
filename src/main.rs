use colored::Colorize;
use craftrelay::{
    AppResult,
    cli::{Cli, Commands, ConfigAction},
    config::Config,
    init_logging, install_panic_hook,
    session::RelayManager,
    transport::{ChatGateway, WsGameTransport},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    if let Commands::Config { action } = cli.command() {
        return run_config_command(&cli, action);
    }

    // Load configuration; a bad file is reported once logging is up
    let loaded = Config::load_or_default(&cli.config_file);
    let log = match &loaded {
        Ok(config) => config.log.clone(),
        Err(_) => Config::default().log,
    };

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = init_logging(&cli.effective_log_level(&log.level), &log)?;
    install_panic_hook();

    tracing::info!("CraftRelay starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config {}: {:#}", cli.config_file, e);
            return Err(format!("Invalid configuration in {}: {:#}", cli.config_file, e).into());
        }
    };

    let warnings = config.warnings();
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    if cli.is_dry_run_mode() {
        println!("{}", "Dry-run mode: not connecting".yellow());
        println!("Config file: {}", cli.config_file);
        config.display_summary()?;
        for warning in &warnings {
            println!("{} {}", "warning:".yellow(), warning);
        }
        return Ok(());
    }

    // Connect to the chat side first; nothing works without it
    let (gateway, inbound) = ChatGateway::connect(&config.chat).await?;
    let transport = Arc::new(WsGameTransport::new(&config.game));

    let mut manager = RelayManager::new(config, transport, Arc::new(gateway));
    manager.run(inbound).await?;

    tracing::info!("CraftRelay stopped");
    Ok(())
}

fn run_config_command(cli: &Cli, action: Option<ConfigAction>) -> AppResult<()> {
    match action {
        Some(ConfigAction::Check) => match Config::load_from_file(&cli.config_file) {
            Ok(config) => {
                config.display_summary()?;
                for warning in config.warnings() {
                    println!("{} {}", "warning:".yellow(), warning);
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {:#}", "Invalid configuration:".red(), e);
                std::process::exit(1);
            }
        },
        Some(ConfigAction::Show) | None => match Config::load_or_default(&cli.config_file) {
            Ok(config) => {
                config.display()?;
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {:#}", "Invalid configuration:".red(), e);
                std::process::exit(1);
            }
        },
    }
}
