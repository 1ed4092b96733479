//! OAuth client configuration.
//!
//! [`AuthConfig`] gathers everything the token lifecycle needs. It is
//! validated once in [`AuthConfig::new`]; a missing client id is rejected
//! there, before any network call can happen.

use std::time::Duration;

use url::Url;

use crate::error::{GoogleError, GoogleResult};

/// Google OAuth 2.0 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Redirect target for the manual copy/paste flow.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Full read/write access to the user's calendars.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Configuration for the OAuth token lifecycle.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client id.
    pub client_id: String,

    /// Client secret. Only sent when `allow_insecure_client_secret` is set.
    pub client_secret: Option<String>,

    /// Opt-in for sending `client_secret` from the client side.
    ///
    /// Development only: a secret shipped with a client is not secret.
    pub allow_insecure_client_secret: bool,

    /// Redirect URI registered for the client.
    pub redirect_uri: String,

    /// Requested OAuth scopes.
    pub scopes: Vec<String>,

    /// Delegated exchange endpoint. When set, authorization codes are
    /// exchanged by this backend instead of the token endpoint.
    pub backend_exchange_url: Option<Url>,

    /// Authorization endpoint.
    pub auth_url: Url,

    /// Token endpoint.
    pub token_url: Url,

    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl AuthConfig {
    /// Creates a configuration for `client_id` with Google's endpoints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `client_id` is blank.
    pub fn new(client_id: impl Into<String>) -> GoogleResult<Self> {
        let client_id = client_id.into().trim().to_string();
        if client_id.is_empty() {
            return Err(GoogleError::configuration(
                "missing Google client id; set GOOGLE_CLIENT_ID or [google].client_id",
            ));
        }

        Ok(Self {
            client_id,
            client_secret: None,
            allow_insecure_client_secret: false,
            redirect_uri: OOB_REDIRECT_URI.to_string(),
            scopes: vec![CALENDAR_SCOPE.to_string()],
            backend_exchange_url: None,
            auth_url: parse_url(GOOGLE_AUTH_URL)?,
            token_url: parse_url(GOOGLE_TOKEN_URL)?,
            request_timeout: None,
        })
    }

    /// Builder: set the client secret.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.client_secret = (!secret.is_empty()).then_some(secret);
        self
    }

    /// Builder: allow sending the client secret from this client.
    pub fn with_insecure_client_secret(mut self, allow: bool) -> Self {
        self.allow_insecure_client_secret = allow;
        self
    }

    /// Builder: set the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Builder: set the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Builder: set the delegated exchange endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `url` does not parse.
    pub fn with_backend_exchange_url(mut self, url: &str) -> GoogleResult<Self> {
        self.backend_exchange_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Builder: override the authorization endpoint.
    pub fn with_auth_url(mut self, url: &str) -> GoogleResult<Self> {
        self.auth_url = parse_url(url)?;
        Ok(self)
    }

    /// Builder: override the token endpoint.
    pub fn with_token_url(mut self, url: &str) -> GoogleResult<Self> {
        self.token_url = parse_url(url)?;
        Ok(self)
    }

    /// Builder: set a per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Checks that the configuration can start an authorization.
    pub fn validate(&self) -> GoogleResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(GoogleError::configuration("missing Google client id"));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(GoogleError::configuration("missing redirect URI"));
        }
        if self.scopes.is_empty() {
            return Err(GoogleError::configuration("no OAuth scopes configured"));
        }
        Ok(())
    }

    /// Returns the client secret when sending it is explicitly allowed.
    pub fn insecure_client_secret(&self) -> Option<&str> {
        if self.allow_insecure_client_secret {
            self.client_secret.as_deref()
        } else {
            None
        }
    }

    /// Returns the loopback port of the redirect URI, if it points at this
    /// machine (`127.0.0.1`, `localhost` or `[::1]`).
    pub fn loopback_port(&self) -> Option<u16> {
        let url = Url::parse(&self.redirect_uri).ok()?;
        match url.host_str()? {
            "127.0.0.1" | "localhost" | "[::1]" => url.port_or_known_default(),
            _ => None,
        }
    }

    /// Builds an HTTP client honouring `request_timeout`.
    pub(crate) fn http_client(&self) -> GoogleResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(format!("daysync/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| GoogleError::internal(format!("failed to create HTTP client: {}", e)))
    }
}

fn parse_url(value: &str) -> GoogleResult<Url> {
    Url::parse(value)
        .map_err(|e| GoogleError::configuration(format!("invalid URL '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoogleErrorCode;

    #[test]
    fn defaults() {
        let config = AuthConfig::new("id.apps.googleusercontent.com").unwrap();
        assert_eq!(config.redirect_uri, OOB_REDIRECT_URI);
        assert_eq!(config.scopes, vec![CALENDAR_SCOPE.to_string()]);
        assert_eq!(config.token_url.as_str(), GOOGLE_TOKEN_URL);
        assert!(config.backend_exchange_url.is_none());
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn blank_client_id_is_rejected() {
        let err = AuthConfig::new("   ").unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::ConfigurationError);
    }

    #[test]
    fn validate_rejects_emptied_fields() {
        let mut config = AuthConfig::new("id").unwrap();
        assert!(config.validate().is_ok());

        config.scopes.clear();
        assert_eq!(
            config.validate().unwrap_err().code(),
            GoogleErrorCode::ConfigurationError
        );

        let config = AuthConfig::new("id").unwrap().with_redirect_uri(" ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_requires_opt_in() {
        let config = AuthConfig::new("id")
            .unwrap()
            .with_client_secret("shh");
        assert!(config.insecure_client_secret().is_none());

        let config = config.with_insecure_client_secret(true);
        assert_eq!(config.insecure_client_secret(), Some("shh"));
    }

    #[test]
    fn empty_secret_is_ignored() {
        let config = AuthConfig::new("id")
            .unwrap()
            .with_client_secret("")
            .with_insecure_client_secret(true);
        assert!(config.insecure_client_secret().is_none());
    }

    #[test]
    fn invalid_backend_url_is_rejected() {
        let err = AuthConfig::new("id")
            .unwrap()
            .with_backend_exchange_url("not a url")
            .unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::ConfigurationError);
    }

    #[test]
    fn loopback_port_detection() {
        let config = AuthConfig::new("id")
            .unwrap()
            .with_redirect_uri("http://127.0.0.1:8765/callback");
        assert_eq!(config.loopback_port(), Some(8765));

        let config = config.with_redirect_uri("http://localhost:5173/oauth2callback.html");
        assert_eq!(config.loopback_port(), Some(5173));

        let config = config.with_redirect_uri(OOB_REDIRECT_URI);
        assert_eq!(config.loopback_port(), None);

        let config = config.with_redirect_uri("https://example.com/cb");
        assert_eq!(config.loopback_port(), None);
    }
}
