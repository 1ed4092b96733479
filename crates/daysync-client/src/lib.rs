//! `daysync` command-line client.
//!
//! Connects a Google account, keeps its token fresh and prints today's
//! calendar events as a task list.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
