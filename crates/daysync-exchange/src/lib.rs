//! Delegated OAuth code exchange endpoint.
//!
//! Holds the confidential client secret so that public clients can trade an
//! authorization code for tokens without shipping it.

pub mod config;
pub mod error;
pub mod router;
pub mod signals;

pub use config::ExchangeConfig;
pub use error::{ExchangeError, ExchangeResult};
pub use router::{AppState, router};
pub use signals::shutdown_signal;
