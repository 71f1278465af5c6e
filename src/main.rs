use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{debug, info};

mod api;
mod cli;
mod config;

use api::recovery::AutoFixOrchestrator;
use api::{EventBus, LifecycleConfig, SqliteCredentialStore, TokenManager, constants};
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("declare-cli.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let cli = Cli::parse();
    info!("Starting declare-cli");

    let config = config::Config::load().await?;
    debug!("Config database: {:?}", config.path());

    // One explicit lifecycle context per process, passed by reference to
    // whoever needs it
    let lifecycle = LifecycleConfig::from_env();
    let events = EventBus::default();
    let store = Arc::new(SqliteCredentialStore::new(config.pool().clone()));
    let manager = TokenManager::new(
        store,
        constants::TOKEN_KIND_PORTAL,
        lifecycle.cache.clone(),
        events.clone(),
    );
    let orchestrator = AutoFixOrchestrator::new(manager.clone(), &lifecycle, events);

    match cli.command {
        cli::Commands::Token(token_args) => {
            cli::commands::token_command(token_args, &config, &manager, &orchestrator).await?;
        }
    }

    Ok(())
}
