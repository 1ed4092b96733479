//! daysync CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use daysync_client::cli::{Cli, Command, ConfigAction};
use daysync_client::commands;
use daysync_client::config::ClientConfig;
use daysync_client::error::ClientResult;
use daysync_core::{TracingConfig, init_tracing};
use daysync_google::CalendarClient;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::cli(cli.debug)) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let (mut config, config_path) = match cli.config {
        Some(path) => (ClientConfig::load_from(&path)?, path),
        None => (ClientConfig::load()?, ClientConfig::default_path()),
    };
    config.apply_args(&cli.google);

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
        Command::Auth { force } => {
            let auth = commands::google_auth(&config)?;
            commands::auth::run(&auth, force).await
        }
        Command::Code { code } => {
            let auth = commands::google_auth(&config)?;
            commands::code::run(&auth, &code).await
        }
        Command::Token => {
            let auth = commands::google_auth(&config)?;
            commands::token::run(&auth).await
        }
        Command::Today { calendar, json } => {
            let auth = commands::google_auth(&config)?;
            let calendar_id = calendar.unwrap_or_else(|| config.google.calendar_id.clone());
            let client = CalendarClient::new(auth)?;
            commands::today::run(&client, &calendar_id, json).await
        }
        Command::Disconnect => {
            let auth = commands::google_auth(&config)?;
            commands::disconnect::run(&auth)
        }
    }
}
