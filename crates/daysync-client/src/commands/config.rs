//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dumps the effective configuration with plain-text secrets masked.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    println!("# config.toml ({})", path.display());
    println!("{}", render(config)?);
    Ok(())
}

pub(crate) fn render(config: &ClientConfig) -> ClientResult<String> {
    let printable = ClientConfig {
        google: config.google.redacted(),
        storage: config.storage.clone(),
    };
    toml::to_string_pretty(&printable)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))
}

/// Resolves credentials and checks the Google settings.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    if config.google.calendar_id.trim().is_empty() {
        return Err(ClientError::config("google.calendar_id must not be empty"));
    }
    let auth = config.google.to_auth_config()?;
    match auth.loopback_port() {
        Some(port) => println!("Redirects are received on 127.0.0.1:{}.", port),
        None => println!("Authorization codes are pasted manually."),
    }
    if auth.backend_exchange_url.is_some() {
        println!("Codes are exchanged by the configured backend.");
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Shows the configuration and storage paths.
pub fn path(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    println!("config:  {}", config_path.display());
    match config.storage.settings_file() {
        Some(file) => println!("tokens:  {}", file.display()),
        None => println!("tokens:  (local store only)"),
    }
    println!("local:   {}", config.storage.local_dir().display());
    Ok(())
}
