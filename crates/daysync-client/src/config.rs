//! Client configuration.
//!
//! Settings live in `~/.config/daysync/config.toml` by default:
//!
//! ```toml
//! [google]
//! client_id = "xxx.apps.googleusercontent.com"
//! client_secret = "pass::google/daysync"   # optional
//! redirect_uri = "http://127.0.0.1:8765/callback"
//! calendar_id = "primary"
//!
//! [storage]
//! data_dir = "/home/me/.local/share/daysync"
//! ```
//!
//! `client_id` and `client_secret` accept secret references (`pass::`,
//! `env::`), see [`crate::secret`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use daysync_google::config::OOB_REDIRECT_URI;
use daysync_google::{
    AuthConfig, DEFAULT_CALENDAR_ID, HostSettingsStore, LocalFallbackStore, TokenStore,
};

use crate::cli::GoogleArgs;
use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Configuration for the daysync client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google account settings.
    pub google: GoogleSettings,

    /// Token storage locations.
    pub storage: StorageSettings,
}

/// Google OAuth and Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Send `client_secret` to the token endpoint. Development only.
    pub allow_insecure_client_secret: bool,

    /// Redirect URI registered for the client.
    pub redirect_uri: Option<String>,

    /// Requested scopes; Google Calendar when empty.
    pub scopes: Vec<String>,

    /// Delegated exchange endpoint (`daysync-exchange`).
    pub backend_exchange_url: Option<String>,

    /// Calendar read by `daysync today`.
    pub calendar_id: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            allow_insecure_client_secret: false,
            redirect_uri: None,
            scopes: Vec::new(),
            backend_exchange_url: None,
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            request_timeout_secs: None,
        }
    }
}

/// Where tokens are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Data directory; defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,

    /// Primary settings file (JSON map). Defaults to
    /// `<data_dir>/settings.json`.
    pub settings_file: Option<PathBuf>,

    /// Skip the primary settings file and keep everything in the local
    /// store.
    pub local_only: bool,
}

impl ClientConfig {
    /// Loads the configuration from the default path, or defaults when the
    /// file does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads the configuration from `path`.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses TOML configuration.
    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content).map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daysync")
            .join("config.toml")
    }

    /// Returns the default data directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daysync")
    }

    /// Applies command-line and environment overrides.
    pub fn apply_args(&mut self, args: &GoogleArgs) {
        if let Some(id) = &args.client_id {
            self.google.client_id = Some(id.clone());
        }
        if let Some(secret) = &args.client_secret {
            self.google.client_secret = Some(secret.clone());
        }
        if let Some(url) = &args.backend_exchange_url {
            self.google.backend_exchange_url = Some(url.clone());
        }
        if let Some(uri) = &args.redirect_uri {
            self.google.redirect_uri = Some(uri.clone());
        }
    }
}

impl GoogleSettings {
    /// Resolves credentials and builds the auth configuration.
    pub fn to_auth_config(&self) -> ClientResult<AuthConfig> {
        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            ClientError::config(format!(
                "Google client_id not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n\n  \
                 or set GOOGLE_CLIENT_ID",
                ClientConfig::default_path().display()
            ))
        })?;
        let client_id = secret::resolve(raw_id)?;

        let mut config = AuthConfig::new(client_id)?
            .with_insecure_client_secret(self.allow_insecure_client_secret)
            .with_redirect_uri(
                self.redirect_uri
                    .clone()
                    .unwrap_or_else(|| OOB_REDIRECT_URI.to_string()),
            );

        if let Some(raw_secret) = self.client_secret.as_deref() {
            config = config.with_client_secret(secret::resolve(raw_secret)?);
        }
        if !self.scopes.is_empty() {
            config = config.with_scopes(self.scopes.clone());
        }
        if let Some(url) = self.backend_exchange_url.as_deref().filter(|u| !u.is_empty()) {
            config = config.with_backend_exchange_url(url)?;
        }
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns a copy safe to print: plain-text secrets are masked.
    pub fn redacted(&self) -> Self {
        Self {
            client_secret: self.client_secret.as_deref().map(secret::redact),
            ..self.clone()
        }
    }
}

impl StorageSettings {
    /// Returns the data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(ClientConfig::default_data_dir)
    }

    /// Returns the primary settings file, if one is used.
    pub fn settings_file(&self) -> Option<PathBuf> {
        if self.local_only {
            return None;
        }
        Some(
            self.settings_file
                .clone()
                .unwrap_or_else(|| self.data_dir().join("settings.json")),
        )
    }

    /// Returns the local store directory.
    pub fn local_dir(&self) -> PathBuf {
        self.data_dir().join("local")
    }

    /// Builds the token store over the configured backends.
    pub fn token_store(&self) -> TokenStore {
        let store = TokenStore::new(Arc::new(LocalFallbackStore::new(self.local_dir())));
        match self.settings_file() {
            Some(path) => store.with_primary(Arc::new(HostSettingsStore::new(path))),
            None => store,
        }
    }
}
