//! Exchange endpoint error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors raised by the exchange endpoint.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Missing or invalid configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The request body is not valid JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The provider could not be reached or its body could not be read.
    #[error("token endpoint request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// IO error (bind, serve).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExchangeError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        error!(error = %self, "exchange failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "server_error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
