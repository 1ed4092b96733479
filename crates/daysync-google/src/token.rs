//! Token records and their persistence.
//!
//! A [`StoredToken`] is the token response plus an absolute expiry computed
//! once at save time. It is written as JSON under [`TOKEN_STORAGE_KEY`]:
//!
//! ```json
//! {"token":{"access_token":"...","refresh_token":"...","expires_in":3599},"expiresAt":1718450000000}
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GoogleError, GoogleResult};
use crate::store::SettingsStore;

/// Settings key holding the serialized [`StoredToken`].
pub const TOKEN_STORAGE_KEY: &str = "gcal_plugin_token";

/// Local-store key holding the PKCE verifier of the current attempt.
pub const CODE_VERIFIER_KEY: &str = "gcal_code_verifier";

/// A token is treated as expired this long before its actual expiry.
pub const EXPIRY_BUFFER_MS: i64 = 10_000;

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Lifetime in seconds, relative to issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenRecord {
    /// Creates a record holding only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            scope: None,
            token_type: None,
        }
    }

    /// Builder: set the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Builder: set the lifetime in seconds.
    pub fn with_expires_in(mut self, secs: i64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    /// Carries `previous` forward when this record has no refresh token.
    ///
    /// Refresh responses usually omit the refresh token; the old one stays
    /// valid and must not be lost.
    pub fn merge_refresh_token(mut self, previous: Option<&str>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.map(str::to_string);
        }
        self
    }
}

/// A token record with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: TokenRecord,

    /// Expiry as epoch milliseconds. Absent when the response had no
    /// `expires_in`.
    #[serde(
        rename = "expiresAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<i64>,
}

impl StoredToken {
    /// Wraps `token`, computing the expiry relative to `now_ms`.
    pub fn new(token: TokenRecord, now_ms: i64) -> Self {
        let expires_at = token
            .expires_in
            .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)));
        Self { token, expires_at }
    }

    /// Returns true when the access token can be used at `now_ms`.
    ///
    /// A record without an expiry is never usable.
    pub fn is_usable_at(&self, now_ms: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_ms < expires_at.saturating_sub(EXPIRY_BUFFER_MS),
            None => false,
        }
    }

    /// Returns true when the access token can be used now.
    pub fn is_usable(&self) -> bool {
        self.is_usable_at(now_millis())
    }

    /// Returns the refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.token.refresh_token.as_deref()
    }
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Persists the token record across a primary and a fallback store.
#[derive(Clone)]
pub struct TokenStore {
    primary: Option<Arc<dyn SettingsStore>>,
    fallback: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("primary", &self.primary.as_ref().map(|s| s.name().to_string()))
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl TokenStore {
    /// Creates a store writing only to `fallback`.
    pub fn new(fallback: Arc<dyn SettingsStore>) -> Self {
        Self {
            primary: None,
            fallback,
        }
    }

    /// Builder: prefer `primary` for reads and writes.
    pub fn with_primary(mut self, primary: Arc<dyn SettingsStore>) -> Self {
        self.primary = Some(primary);
        self
    }

    /// Saves `token`, stamping its expiry from the current time.
    pub fn save(&self, token: TokenRecord) -> GoogleResult<StoredToken> {
        self.save_at(token, now_millis())
    }

    /// Saves `token` with its expiry computed relative to `now_ms`.
    ///
    /// A failed primary write is logged and retried on the fallback store.
    pub fn save_at(&self, token: TokenRecord, now_ms: i64) -> GoogleResult<StoredToken> {
        let stored = StoredToken::new(token, now_ms);
        let payload = serde_json::to_string(&stored)
            .map_err(|e| GoogleError::internal(format!("failed to serialize token: {}", e)))?;

        if let Some(primary) = &self.primary {
            match primary.write(TOKEN_STORAGE_KEY, &payload) {
                Ok(()) => {
                    info!(store = primary.name(), "saved token");
                    return Ok(stored);
                }
                Err(e) => {
                    warn!(
                        store = primary.name(),
                        error = %e,
                        "failed to save token, falling back to local store"
                    );
                }
            }
        }

        self.fallback.write(TOKEN_STORAGE_KEY, &payload)?;
        info!(store = self.fallback.name(), "saved token");
        Ok(stored)
    }

    /// Loads the stored token.
    ///
    /// The primary store wins when it holds the key. Unreadable or malformed
    /// entries are logged and treated as absent.
    pub fn load(&self) -> Option<StoredToken> {
        if let Some(primary) = &self.primary {
            match primary.read(TOKEN_STORAGE_KEY) {
                Ok(Some(raw)) => return parse_stored(primary.as_ref(), &raw),
                Ok(None) => {}
                Err(e) => {
                    warn!(store = primary.name(), error = %e, "failed to read token");
                }
            }
        }

        match self.fallback.read(TOKEN_STORAGE_KEY) {
            Ok(Some(raw)) => parse_stored(self.fallback.as_ref(), &raw),
            Ok(None) => {
                debug!("no stored token");
                None
            }
            Err(e) => {
                warn!(store = self.fallback.name(), error = %e, "failed to read token");
                None
            }
        }
    }

    /// Removes the token from every store. Failures are logged only.
    pub fn clear(&self) {
        let stores = self.primary.iter().chain(std::iter::once(&self.fallback));
        for store in stores {
            match store.remove(TOKEN_STORAGE_KEY) {
                Ok(()) => debug!(store = store.name(), "cleared token"),
                Err(e) => warn!(store = store.name(), error = %e, "failed to clear token"),
            }
        }
        info!("token cleared");
    }

    /// Stores the PKCE verifier of the current attempt, replacing any
    /// previous one.
    pub fn put_verifier(&self, verifier: &str) -> GoogleResult<()> {
        self.fallback.write(CODE_VERIFIER_KEY, verifier)
    }

    /// Reads back the PKCE verifier of the current attempt.
    pub fn verifier(&self) -> Option<String> {
        match self.fallback.read(CODE_VERIFIER_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read code verifier");
                None
            }
        }
    }

    /// Removes the PKCE verifier. Failures are logged only.
    pub fn clear_verifier(&self) {
        if let Err(e) = self.fallback.remove(CODE_VERIFIER_KEY) {
            warn!(error = %e, "failed to remove code verifier");
        }
    }
}

fn parse_stored(store: &dyn SettingsStore, raw: &str) -> Option<StoredToken> {
    match serde_json::from_str::<StoredToken>(raw) {
        Ok(stored) => Some(stored),
        Err(e) => {
            warn!(store = store.name(), error = %e, "stored token is malformed, ignoring it");
            None
        }
    }
}
