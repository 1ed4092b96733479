//! Authorization code exchange and token refresh.
//!
//! Codes are exchanged either at the token endpoint directly (public client
//! with PKCE) or through a delegated backend that holds the client secret.
//! Refresh always goes to the token endpoint. No request is retried.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::AuthConfig;
use crate::error::{GoogleError, GoogleResult, body_snippet};
use crate::token::TokenRecord;

/// Body sent to a delegated exchange backend.
#[derive(Debug, Serialize)]
struct BackendExchangeRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
}

/// Error body returned by OAuth endpoints.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// The token request being made, used in error messages and logs.
#[derive(Debug, Clone, Copy)]
enum Operation {
    BackendExchange,
    Exchange,
    Refresh,
}

impl Operation {
    fn failure_prefix(self) -> &'static str {
        match self {
            Self::BackendExchange => "backend token exchange failed",
            Self::Exchange => "token exchange failed",
            Self::Refresh => "refresh token failed",
        }
    }
}

/// Performs token endpoint requests for one OAuth client.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    config: AuthConfig,
    http: reqwest::Client,
}

impl TokenExchanger {
    /// Creates an exchanger for `config`.
    pub fn new(config: AuthConfig) -> GoogleResult<Self> {
        let http = config.http_client()?;
        Ok(Self { config, http })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Exchanges an authorization code and its PKCE verifier for a token.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> GoogleResult<TokenRecord> {
        if let Some(backend) = &self.config.backend_exchange_url {
            debug!(url = %backend, "exchanging code through backend");
            let body = BackendExchangeRequest {
                code,
                redirect_uri: &self.config.redirect_uri,
                code_verifier: verifier,
            };
            let response = self
                .http
                .post(backend.clone())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    GoogleError::network(format!("backend exchange request failed: {}", e))
                        .with_source(e)
                })?;
            return read_token_response(response, Operation::BackendExchange).await;
        }

        let mut params = vec![
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = self.config.insecure_client_secret() {
            warn!("sending client secret from the client side, development use only");
            params.push(("client_secret", secret));
        }

        debug!(url = %self.config.token_url, "exchanging code at token endpoint");
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                GoogleError::network(format!("token exchange request failed: {}", e))
                    .with_source(e)
            })?;
        read_token_response(response, Operation::Exchange).await
    }

    /// Obtains a new access token from a refresh token.
    ///
    /// The returned record usually lacks a refresh token; callers merge the
    /// previous one forward.
    pub async fn refresh(&self, refresh_token: &str) -> GoogleResult<TokenRecord> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        debug!(url = %self.config.token_url, "refreshing access token");
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                GoogleError::network(format!("token refresh request failed: {}", e))
                    .with_source(e)
            })?;
        read_token_response(response, Operation::Refresh).await
    }
}

async fn read_token_response(
    response: reqwest::Response,
    operation: Operation,
) -> GoogleResult<TokenRecord> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GoogleError::network(format!("failed to read response: {}", e)))?;

    if !status.is_success() {
        let detail = failure_detail(status, &body);
        error!(
            status = status.as_u16(),
            body = %body_snippet(&body),
            "{}",
            operation.failure_prefix()
        );
        return Err(GoogleError::token_exchange(format!(
            "{}: {}",
            operation.failure_prefix(),
            detail
        ))
        .with_status(status.as_u16())
        .with_body(&body));
    }

    let token: TokenRecord = serde_json::from_str(&body).map_err(|e| {
        GoogleError::invalid_response(format!("invalid token response: {}", e)).with_body(&body)
    })?;
    info!(
        has_refresh_token = token.refresh_token.is_some(),
        expires_in = token.expires_in,
        "{} succeeded",
        match operation {
            Operation::Refresh => "token refresh",
            _ => "code exchange",
        }
    );
    Ok(token)
}

/// Formats `error: error_description` when the body carries both, otherwise
/// the HTTP status line.
fn failure_detail(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<OAuthErrorBody>(body).ok();
    match parsed {
        Some(OAuthErrorBody {
            error: Some(error),
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        _ => match status.canonical_reason() {
            Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
            None => format!("HTTP {}", status.as_u16()),
        },
    }
}
