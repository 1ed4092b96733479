//! Access token provider and interactive authorization.
//!
//! [`GoogleAuth`] ties the pieces together:
//!
//! 1. [`GoogleAuth::get_access_token`] returns a usable token, refreshing it
//!    silently when possible. It never starts an interactive flow.
//! 2. [`GoogleAuth::start_auth`] runs the PKCE authorization for a new
//!    attempt and persists the resulting token.
//! 3. [`GoogleAuth::disconnect`] forgets the token.

use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::acquire::{CodeAcquirer, build_auth_url};
use crate::config::AuthConfig;
use crate::error::{GoogleError, GoogleResult};
use crate::exchange::TokenExchanger;
use crate::pkce::PkcePair;
use crate::session::{AuthSession, AuthStatus, SessionRegistry};
use crate::token::{StoredToken, TokenStore};

/// Google OAuth token lifecycle for one client.
#[derive(Debug)]
pub struct GoogleAuth {
    exchanger: TokenExchanger,
    store: TokenStore,
    sessions: SessionRegistry,
}

impl GoogleAuth {
    /// Creates a provider for `config` persisting into `store`.
    pub fn new(config: AuthConfig, store: TokenStore) -> GoogleResult<Self> {
        config.validate()?;
        Ok(Self {
            exchanger: TokenExchanger::new(config)?,
            store,
            sessions: SessionRegistry::new(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AuthConfig {
        self.exchanger.config()
    }

    /// Returns the token store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns a usable access token, or `None`.
    ///
    /// An expired token is refreshed once when a refresh token is stored;
    /// the refreshed record keeps the previous refresh token unless a new
    /// one was issued. Refresh failures are logged and yield `None`.
    pub async fn get_access_token(&self) -> Option<String> {
        let Some(stored) = self.store.load() else {
            debug!("no stored token");
            return None;
        };

        if stored.is_usable() {
            return Some(stored.token.access_token);
        }

        let Some(refresh_token) = stored.refresh_token().map(str::to_string) else {
            debug!("token expired and no refresh token is stored");
            return None;
        };

        info!("access token expired, refreshing");
        let refreshed = match self.exchanger.refresh(&refresh_token).await {
            Ok(token) => token.merge_refresh_token(Some(&refresh_token)),
            Err(e) => {
                error!(error = %e, "failed to refresh access token");
                return None;
            }
        };

        match self.store.save(refreshed) {
            Ok(saved) => Some(saved.token.access_token),
            Err(e) => {
                error!(error = %e, "failed to persist refreshed token");
                None
            }
        }
    }

    /// Returns true when a token record is stored.
    pub fn is_connected(&self) -> bool {
        self.store.load().is_some()
    }

    /// Registers a new authorization attempt.
    ///
    /// Use this with [`run_auth`](Self::run_auth) when something, such as a
    /// callback listener, needs the session before the flow starts.
    pub fn begin_auth(&self) -> Arc<AuthSession> {
        self.sessions.begin()
    }

    /// Cancels an attempt from [`begin_auth`](Self::begin_auth) that will
    /// not be run, and forgets it.
    pub fn abandon_auth(&self, session: &AuthSession) {
        session.cancel();
        self.sessions.finish(&session.id());
        debug!(attempt = %session.id(), "authorization attempt abandoned");
    }

    /// Returns the number of registered, unfinished attempts.
    pub fn active_attempts(&self) -> usize {
        self.sessions.len()
    }

    /// Runs a complete authorization attempt.
    pub async fn start_auth(&self, acquirer: &CodeAcquirer<'_>) -> GoogleResult<StoredToken> {
        let session = self.begin_auth();
        self.run_auth(&session, acquirer).await
    }

    /// Runs the authorization for a session created by
    /// [`begin_auth`](Self::begin_auth).
    ///
    /// Emits `Exchanging` once a code is in hand, then `Connected` or
    /// `Error`. Only one attempt should run at a time; concurrent attempts
    /// do not share resolvers but do share the stored verifier.
    pub async fn run_auth(
        &self,
        session: &AuthSession,
        acquirer: &CodeAcquirer<'_>,
    ) -> GoogleResult<StoredToken> {
        let result = self.authorize(session, acquirer).await;
        self.sessions.finish(&session.id());

        if let Err(e) = &result {
            session.emit(AuthStatus::Error {
                message: e.message().to_string(),
            });
            if mentions_client_secret(e) {
                error!(
                    client_id = %self.config().client_id,
                    redirect_uri = %self.config().redirect_uri,
                    "the OAuth client requires a client secret; create an OAuth client of type \
                     \"Desktop app\" (or one set up for PKCE without a secret) and use its client id"
                );
            }
        }
        result
    }

    async fn authorize(
        &self,
        session: &AuthSession,
        acquirer: &CodeAcquirer<'_>,
    ) -> GoogleResult<StoredToken> {
        self.config().validate()?;

        let pkce = PkcePair::generate();
        self.store.put_verifier(&pkce.verifier)?;

        let url = build_auth_url(self.config(), &pkce.challenge, &session.id().to_string());
        info!(attempt = %session.id(), "starting Google authorization");

        let code = acquirer
            .acquire(session, &url)
            .await
            .ok_or_else(GoogleError::no_authorization_code)?;

        session.emit(AuthStatus::Exchanging);
        let stored = self.exchange_and_save(&code).await?;
        session.emit(AuthStatus::Connected);
        self.store.clear_verifier();

        info!(attempt = %session.id(), "Google account connected");
        Ok(stored)
    }

    /// Exchanges a code obtained outside of a running attempt, using the
    /// verifier of the most recent attempt.
    pub async fn complete_with_code(&self, code: &str) -> GoogleResult<StoredToken> {
        let code = code.trim();
        if code.is_empty() {
            return Err(GoogleError::no_authorization_code());
        }
        let stored = self.exchange_and_save(code).await?;
        self.store.clear_verifier();
        info!("Google account connected");
        Ok(stored)
    }

    async fn exchange_and_save(&self, code: &str) -> GoogleResult<StoredToken> {
        let verifier = self
            .store
            .verifier()
            .ok_or_else(GoogleError::missing_verifier)?;
        let token = self.exchanger.exchange_code(code, &verifier).await?;
        self.store.save(token)
    }

    /// Hands a pasted or received code to the attempt `attempt`.
    ///
    /// Returns false when that attempt is unknown or no longer waiting.
    pub fn provide_auth_code(&self, attempt: &Uuid, code: &str) -> bool {
        let code = code.trim();
        if code.is_empty() {
            return false;
        }
        self.sessions.deliver(attempt, code)
    }

    /// Forgets the stored token.
    pub fn disconnect(&self) {
        self.store.clear();
        info!("Google account disconnected");
    }
}

fn mentions_client_secret(err: &GoogleError) -> bool {
    let text = format!("{} {}", err.message(), err.body().unwrap_or_default()).to_lowercase();
    text.contains("client secret") || text.contains("client_secret")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::acquire::{CodePrompt, Launcher, PopupHandle};
    use crate::error::GoogleErrorCode;
    use crate::store::LocalFallbackStore;
    use crate::token::{TokenRecord, now_millis};
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoBrowser;

    impl Launcher for NoBrowser {
        fn open(&self, _url: &Url) -> Option<Box<dyn PopupHandle>> {
            None
        }
    }

    /// Answers with a fixed code, optionally removing the verifier first.
    struct Paste {
        code: Option<&'static str>,
        drop_verifier: Option<TokenStore>,
    }

    impl CodePrompt for Paste {
        fn prompt<'a>(&'a self, _url: &'a Url) -> BoxFuture<'a, Option<String>> {
            if let Some(store) = &self.drop_verifier {
                store.clear_verifier();
            }
            let code = self.code.map(str::to_string);
            Box::pin(async move { code })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        server: MockServer,
        auth: GoogleAuth,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let config = AuthConfig::new("client-123")
            .unwrap()
            .with_token_url(&format!("{}/token", server.uri()))
            .unwrap();
        let store = TokenStore::new(Arc::new(LocalFallbackStore::new(dir.path())));
        let auth = GoogleAuth::new(config, store).unwrap();
        Fixture {
            _dir: dir,
            server,
            auth,
        }
    }

    fn expired_record(refresh: Option<&str>) -> TokenRecord {
        let mut record = TokenRecord::new("old-access").with_expires_in(3600);
        record.refresh_token = refresh.map(str::to_string);
        record
    }

    #[tokio::test]
    async fn valid_token_needs_no_network() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&f.server)
            .await;

        f.auth
            .store()
            .save(TokenRecord::new("fresh").with_expires_in(3600))
            .unwrap();
        assert_eq!(f.auth.get_access_token().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let two_hours_ago = now_millis() - 2 * 3_600_000;
        f.auth
            .store()
            .save_at(expired_record(Some("R1")), two_hours_ago)
            .unwrap();

        assert_eq!(
            f.auth.get_access_token().await.as_deref(),
            Some("new-access")
        );

        let stored = f.auth.store().load().unwrap();
        assert_eq!(stored.token.access_token, "new-access");
        assert_eq!(stored.refresh_token(), Some("R1"));
        assert!(stored.is_usable());

        // The refreshed token is now served from storage.
        assert_eq!(
            f.auth.get_access_token().await.as_deref(),
            Some("new-access")
        );
    }

    #[tokio::test]
    async fn rotated_refresh_token_replaces_the_old_one() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "rotated-access",
                "refresh_token": "R2",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let two_hours_ago = now_millis() - 2 * 3_600_000;
        f.auth
            .store()
            .save_at(expired_record(Some("R1")), two_hours_ago)
            .unwrap();

        assert_eq!(
            f.auth.get_access_token().await.as_deref(),
            Some("rotated-access")
        );
        let stored = f.auth.store().load().unwrap();
        assert_eq!(stored.token.access_token, "rotated-access");
        assert_eq!(stored.refresh_token(), Some("R2"));
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_none() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&f.server)
            .await;

        f.auth
            .store()
            .save_at(expired_record(None), now_millis() - 2 * 3_600_000)
            .unwrap();
        assert!(f.auth.get_access_token().await.is_none());
    }

    #[tokio::test]
    async fn refresh_failure_is_none_and_keeps_record() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let saved = f
            .auth
            .store()
            .save_at(expired_record(Some("R1")), now_millis() - 2 * 3_600_000)
            .unwrap();

        assert!(f.auth.get_access_token().await.is_none());
        assert_eq!(f.auth.store().load(), Some(saved));
    }

    #[tokio::test]
    async fn missing_token_is_none() {
        let f = fixture().await;
        assert!(f.auth.get_access_token().await.is_none());
        assert!(!f.auth.is_connected());
    }

    #[tokio::test]
    async fn start_auth_exchanges_and_persists() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=pasted-code"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "refresh_token": "R",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let launcher = NoBrowser;
        let prompt = Paste {
            code: Some("pasted-code"),
            drop_verifier: None,
        };
        let acquirer = CodeAcquirer::new(&launcher, &prompt);

        let session = f.auth.begin_auth();
        let mut status = session.subscribe();
        let stored = f.auth.run_auth(&session, &acquirer).await.unwrap();

        assert_eq!(stored.token.access_token, "A");
        assert_eq!(f.auth.store().load(), Some(stored));
        assert!(f.auth.store().verifier().is_none());
        assert_eq!(*status.borrow_and_update(), AuthStatus::Connected);
        assert!(f.auth.is_connected());
        assert!(!f.auth.provide_auth_code(&session.id(), "late"));
    }

    #[tokio::test]
    async fn cancelled_attempt_reports_no_code() {
        let f = fixture().await;
        let launcher = NoBrowser;
        let prompt = Paste {
            code: None,
            drop_verifier: None,
        };
        let acquirer = CodeAcquirer::new(&launcher, &prompt);

        let session = f.auth.begin_auth();
        let canceller = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let err = f.auth.run_auth(&session, &acquirer).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::NoAuthorizationCode);
        assert_eq!(
            session.status(),
            AuthStatus::Error {
                message: "no authorization code provided".into()
            }
        );
    }

    #[tokio::test]
    async fn missing_verifier_fails_before_exchange() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&f.server)
            .await;

        let launcher = NoBrowser;
        let prompt = Paste {
            code: Some("code"),
            drop_verifier: Some(f.auth.store().clone()),
        };
        let acquirer = CodeAcquirer::new(&launcher, &prompt);

        let err = f.auth.start_auth(&acquirer).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::MissingVerifier);
    }

    #[tokio::test]
    async fn client_secret_rejection_is_reported() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_request",
                "error_description": "client_secret is missing."
            })))
            .mount(&f.server)
            .await;

        let launcher = NoBrowser;
        let prompt = Paste {
            code: Some("code"),
            drop_verifier: None,
        };
        let acquirer = CodeAcquirer::new(&launcher, &prompt);

        let session = f.auth.begin_auth();
        let err = f.auth.run_auth(&session, &acquirer).await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::TokenExchangeFailed);
        assert!(mentions_client_secret(&err));
        assert!(matches!(session.status(), AuthStatus::Error { .. }));
        assert!(!f.auth.is_connected());
    }

    #[tokio::test]
    async fn complete_with_code_uses_stored_verifier() {
        let f = fixture().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code_verifier=stored-verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let err = f.auth.complete_with_code("code").await.unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::MissingVerifier);

        f.auth.store().put_verifier("stored-verifier").unwrap();
        f.auth.complete_with_code(" code \n").await.unwrap();
        assert!(f.auth.store().verifier().is_none());
        assert!(f.auth.is_connected());
    }

    #[tokio::test]
    async fn provide_auth_code_routes_to_attempt() {
        let f = fixture().await;
        let session = f.auth.begin_auth();
        let rx = session.arm(crate::session::AcquireState::AwaitingManualCode);

        assert!(!f.auth.provide_auth_code(&Uuid::new_v4(), "code"));
        assert!(!f.auth.provide_auth_code(&session.id(), "   "));
        assert!(f.auth.provide_auth_code(&session.id(), " code "));
        assert_eq!(rx.await.unwrap().as_deref(), Some("code"));
    }

    #[tokio::test]
    async fn abandoned_attempt_is_cancelled_and_forgotten() {
        let f = fixture().await;
        let session = f.auth.begin_auth();
        assert_eq!(f.auth.active_attempts(), 1);

        f.auth.abandon_auth(&session);

        assert!(session.is_cancelled());
        assert_eq!(f.auth.active_attempts(), 0);
        assert!(!f.auth.provide_auth_code(&session.id(), "code"));
    }

    #[tokio::test]
    async fn disconnect_clears_token() {
        let f = fixture().await;
        f.auth
            .store()
            .save(TokenRecord::new("a").with_expires_in(60))
            .unwrap();
        assert!(f.auth.is_connected());

        f.auth.disconnect();
        assert!(!f.auth.is_connected());
        assert!(f.auth.get_access_token().await.is_none());
    }
}
