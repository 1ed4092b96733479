//! Google OAuth token lifecycle and Calendar API client.
//!
//! - [`GoogleAuth`] - access token provider: load, refresh, interactive
//!   PKCE authorization, disconnect
//! - [`TokenStore`] - token persistence over [`SettingsStore`] backends
//! - [`CodeAcquirer`] - gets the authorization code from the user
//! - [`TokenExchanger`] - token endpoint and delegated backend requests
//! - [`CalendarClient`] - events list/create/update/delete
//!
//! # Flow
//!
//! ```text
//! get_access_token ─▶ TokenStore ──usable──▶ access token
//!                        │
//!                        └─expired─▶ TokenExchanger::refresh ─▶ TokenStore
//!
//! start_auth ─▶ PkcePair ─▶ CodeAcquirer ─▶ TokenExchanger::exchange_code ─▶ TokenStore
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod acquire;
pub mod auth;
pub mod calendar;
pub mod callback;
pub mod config;
pub mod error;
pub mod exchange;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;

/// A boxed future for trait methods used through `dyn`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use acquire::{BrowserLauncher, CodeAcquirer, CodePrompt, Launcher, PopupHandle, StdinPrompt};
pub use auth::GoogleAuth;
pub use calendar::{AccessTokenSource, CalendarClient, DEFAULT_CALENDAR_ID};
pub use callback::CallbackServer;
pub use config::AuthConfig;
pub use error::{GoogleError, GoogleErrorCode, GoogleResult};
pub use exchange::TokenExchanger;
pub use pkce::PkcePair;
pub use session::{AcquireState, AuthSession, AuthStatus, CodeMessage, SessionRegistry};
pub use store::{HostSettingsStore, LocalFallbackStore, SettingsStore};
pub use token::{StoredToken, TokenRecord, TokenStore};
