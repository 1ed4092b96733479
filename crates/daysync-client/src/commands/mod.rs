//! Command implementations.

pub mod auth;
pub mod code;
pub mod config;
pub mod disconnect;
pub mod today;
pub mod token;

use std::sync::Arc;

use daysync_google::GoogleAuth;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Builds the token provider from the resolved configuration.
pub fn google_auth(config: &ClientConfig) -> ClientResult<Arc<GoogleAuth>> {
    let auth_config = config.google.to_auth_config()?;
    let store = config.storage.token_store();
    Ok(Arc::new(GoogleAuth::new(auth_config, store)?))
}
