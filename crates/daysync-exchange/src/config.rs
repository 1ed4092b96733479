//! Exchange endpoint configuration, read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use url::Url;

use crate::error::{ExchangeError, ExchangeResult};

/// Google OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Redirect URI used when a request does not carry one.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173/oauth2callback.html";

/// Origin allowed to call the endpoint from a browser.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

pub const DEFAULT_PORT: u16 = 3000;

/// Exchange endpoint configuration.
#[derive(Clone)]
pub struct ExchangeConfig {
    /// Confidential OAuth client id.
    pub client_id: String,
    /// Confidential OAuth client secret.
    pub client_secret: String,
    /// Redirect URI forwarded when the request has none.
    pub redirect_uri: String,
    /// Listen address.
    pub host: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Single origin allowed by CORS.
    pub allowed_origin: String,
    /// Provider token endpoint.
    pub token_url: Url,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("allowed_origin", &self.allowed_origin)
            .field("token_url", &self.token_url.as_str())
            .finish()
    }
}

impl ExchangeConfig {
    /// Creates a configuration with defaults for everything but the client
    /// credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> ExchangeResult<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(ExchangeError::config(
                "SERVER_CLIENT_ID and SERVER_CLIENT_SECRET must be set",
            ));
        }

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            token_url: parse_url(GOOGLE_TOKEN_URL)?,
        })
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> ExchangeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Recognised keys: `SERVER_CLIENT_ID`, `SERVER_CLIENT_SECRET` (both
    /// required), `SERVER_REDIRECT_URI`, `HOST`, `PORT`, `ALLOWED_ORIGIN`,
    /// `TOKEN_URL`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ExchangeResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(
            get("SERVER_CLIENT_ID").unwrap_or_default(),
            get("SERVER_CLIENT_SECRET").unwrap_or_default(),
        )?;

        if let Some(uri) = get("SERVER_REDIRECT_URI") {
            config.redirect_uri = uri;
        }
        if let Some(host) = get("HOST") {
            config.host = host
                .parse()
                .map_err(|_| ExchangeError::config(format!("invalid HOST '{}'", host)))?;
        }
        if let Some(port) = get("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ExchangeError::config(format!("invalid PORT '{}'", port)))?;
        }
        if let Some(origin) = get("ALLOWED_ORIGIN") {
            config.allowed_origin = origin;
        }
        if let Some(url) = get("TOKEN_URL") {
            config.token_url = parse_url(&url)?;
        }
        Ok(config)
    }

    /// Builder: set the token endpoint.
    pub fn with_token_url(mut self, url: &str) -> ExchangeResult<Self> {
        self.token_url = parse_url(url)?;
        Ok(self)
    }

    /// Builder: set the allowed origin.
    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = origin.into();
        self
    }

    /// Returns the listen address.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_url(value: &str) -> ExchangeResult<Url> {
    Url::parse(value).map_err(|e| ExchangeError::config(format!("invalid URL '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ExchangeConfig::from_lookup(lookup(&[
            ("SERVER_CLIENT_ID", "id"),
            ("SERVER_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.port, 3000);
        assert_eq!(config.allowed_origin, DEFAULT_ALLOWED_ORIGIN);
        assert_eq!(config.token_url.as_str(), GOOGLE_TOKEN_URL);
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn credentials_are_required() {
        let err = ExchangeConfig::from_lookup(lookup(&[("SERVER_CLIENT_ID", "id")])).unwrap_err();
        assert!(matches!(err, ExchangeError::Config { .. }));

        assert!(ExchangeConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn overrides() {
        let config = ExchangeConfig::from_lookup(lookup(&[
            ("SERVER_CLIENT_ID", "id"),
            ("SERVER_CLIENT_SECRET", "secret"),
            ("SERVER_REDIRECT_URI", "http://127.0.0.1:8765/callback"),
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("ALLOWED_ORIGIN", "http://localhost:3001"),
            ("TOKEN_URL", "http://127.0.0.1:9000/token"),
        ]))
        .unwrap();

        assert_eq!(config.redirect_uri, "http://127.0.0.1:8765/callback");
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.allowed_origin, "http://localhost:3001");
        assert_eq!(config.token_url.as_str(), "http://127.0.0.1:9000/token");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = ExchangeConfig::from_lookup(lookup(&[
            ("SERVER_CLIENT_ID", "id"),
            ("SERVER_CLIENT_SECRET", "secret"),
            ("PORT", "http"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("invalid PORT"));
    }

    #[test]
    fn debug_redacts_secret() {
        let config = ExchangeConfig::new("id", "very-secret").unwrap();
        assert!(!format!("{:?}", config).contains("very-secret"));
    }
}
