//! Client error types.

use daysync_google::GoogleError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the `daysync` command line.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A `pass::` or `env::` reference could not be resolved.
    #[error("secret resolution failed: {0}")]
    Secret(String),

    /// Google auth or Calendar error.
    #[error(transparent)]
    Google(#[from] GoogleError),

    /// No usable token; the user must authorize first.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// Output serialization failed.
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Error used when no access token is available.
    pub fn not_connected() -> Self {
        Self::AuthRequired("no Google account connected; run `daysync auth`".to_string())
    }
}
