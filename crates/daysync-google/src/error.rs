//! Error types for the Google integration.
//!
//! Every failure carries a [`GoogleErrorCode`] so callers can tell a
//! misconfiguration from a rejected exchange or a missing token without
//! matching on message text.

use std::fmt;
use thiserror::Error;

/// Maximum number of body characters kept in an error for diagnostics.
pub const BODY_SNIPPET_LIMIT: usize = 2000;

/// The category of a Google integration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoogleErrorCode {
    /// Missing or invalid configuration (e.g. no client id).
    ConfigurationError,
    /// The token endpoint or the delegated backend rejected an exchange.
    TokenExchangeFailed,
    /// Connection failure, DNS error, unreadable body.
    NetworkError,
    /// A success response whose body could not be understood.
    InvalidResponse,
    /// A settings store could not be read or written.
    StorageError,
    /// The authorization flow ended without a code.
    NoAuthorizationCode,
    /// The PKCE verifier for this attempt is gone.
    MissingVerifier,
    /// No usable access token is available.
    NotAuthenticated,
    /// The Calendar API answered with a non-success status.
    ApiError,
    /// Unexpected internal state.
    InternalError,
}

impl GoogleErrorCode {
    /// Returns a stable snake_case name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::StorageError => "storage_error",
            Self::NoAuthorizationCode => "no_authorization_code",
            Self::MissingVerifier => "missing_verifier",
            Self::NotAuthenticated => "not_authenticated",
            Self::ApiError => "api_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for GoogleErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by the Google integration.
#[derive(Debug, Error)]
pub struct GoogleError {
    code: GoogleErrorCode,
    message: String,
    /// HTTP status of the failed response, when there was one.
    status: Option<u16>,
    /// Leading part of the failed response body.
    body: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GoogleError {
    /// Creates an error with the given code and message.
    pub fn new(code: GoogleErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            body: None,
            source: None,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::ConfigurationError, message)
    }

    /// Creates a token exchange error.
    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::TokenExchangeFailed, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::NetworkError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InvalidResponse, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::StorageError, message)
    }

    /// Creates a "no authorization code" error.
    pub fn no_authorization_code() -> Self {
        Self::new(
            GoogleErrorCode::NoAuthorizationCode,
            "no authorization code provided",
        )
    }

    /// Creates a missing verifier error.
    pub fn missing_verifier() -> Self {
        Self::new(
            GoogleErrorCode::MissingVerifier,
            "code verifier not found in storage",
        )
    }

    /// Creates a not authenticated error.
    pub fn not_authenticated() -> Self {
        Self::new(GoogleErrorCode::NotAuthenticated, "no access token available")
    }

    /// Creates a Calendar API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::ApiError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InternalError, message)
    }

    /// Attaches the HTTP status of the failed response.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the failed response body, truncated to
    /// [`BODY_SNIPPET_LIMIT`] characters.
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body_snippet(body));
        self
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> GoogleErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the truncated response body, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl fmt::Display for GoogleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref body) = self.body {
            if !body.is_empty() {
                write!(f, "\n{}", body)?;
            }
        }
        Ok(())
    }
}

/// Returns the first [`BODY_SNIPPET_LIMIT`] characters of `body`.
pub fn body_snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LIMIT).collect()
}

/// A specialized Result type for Google operations.
pub type GoogleResult<T> = Result<T, GoogleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_names() {
        assert_eq!(
            GoogleErrorCode::ConfigurationError.as_str(),
            "configuration_error"
        );
        assert_eq!(GoogleErrorCode::NotAuthenticated.to_string(), "not_authenticated");
    }

    #[test]
    fn error_carries_status_and_body() {
        let err = GoogleError::token_exchange("invalid_grant: Bad Request")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#);
        assert_eq!(err.code(), GoogleErrorCode::TokenExchangeFailed);
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.body(), Some(r#"{"error":"invalid_grant"}"#));

        let display = err.to_string();
        assert!(display.starts_with("token_exchange_failed: invalid_grant: Bad Request"));
        assert!(display.contains("invalid_grant\"}"));
    }

    #[test]
    fn body_is_truncated() {
        let long = "x".repeat(BODY_SNIPPET_LIMIT + 500);
        let err = GoogleError::api("boom").with_body(&long);
        assert_eq!(err.body().unwrap().chars().count(), BODY_SNIPPET_LIMIT);
    }

    #[test]
    fn snippet_counts_characters_not_bytes() {
        let text = "é".repeat(BODY_SNIPPET_LIMIT + 1);
        assert_eq!(body_snippet(&text).chars().count(), BODY_SNIPPET_LIMIT);
    }

    #[test]
    fn error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = GoogleError::storage("failed to write settings").with_source(io_err);
        assert!(err.source().is_some());
    }
}
