//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// daysync - Google Calendar events as today's task list
#[derive(Debug, Parser)]
#[command(name = "daysync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "DAYSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub google: GoogleArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Google settings that override `config.toml`.
#[derive(Debug, Default, clap::Args)]
pub struct GoogleArgs {
    /// OAuth client ID
    #[arg(long, env = "GOOGLE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// OAuth client secret (only sent with --allow-insecure-client-secret)
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Delegated code exchange endpoint
    #[arg(long, env = "DAYSYNC_BACKEND_EXCHANGE_URL", global = true)]
    pub backend_exchange_url: Option<String>,

    /// Redirect URI registered for the OAuth client
    #[arg(long, global = true)]
    pub redirect_uri: Option<String>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect a Google account
    Auth {
        /// Re-authorize even when already connected
        #[arg(long, short)]
        force: bool,
    },

    /// Finish authorization with a code copied from the browser
    Code {
        /// The authorization code
        code: String,
    },

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Show today's tasks from the calendar
    Today {
        /// Calendar to read (defaults to the configured one)
        #[arg(long)]
        calendar: Option<String>,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Forget the stored token
    Disconnect,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration and storage paths
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_today_flags() {
        let cli = Cli::try_parse_from(["daysync", "today", "--calendar", "work", "--json"]).unwrap();
        match cli.command {
            Command::Today { calendar, json } => {
                assert_eq!(calendar.as_deref(), Some("work"));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_google_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "daysync",
            "auth",
            "--client-id",
            "cli-id",
            "--redirect-uri",
            "http://127.0.0.1:8765/callback",
        ])
        .unwrap();
        assert_eq!(cli.google.client_id.as_deref(), Some("cli-id"));
        assert_eq!(
            cli.google.redirect_uri.as_deref(),
            Some("http://127.0.0.1:8765/callback")
        );
        assert!(matches!(cli.command, Command::Auth { force: false }));
    }

    #[test]
    fn code_requires_argument() {
        assert!(Cli::try_parse_from(["daysync", "code"]).is_err());
    }
}
