//! Completing authorization with a pasted code.

use daysync_google::GoogleAuth;
use tracing::info;

use crate::error::ClientResult;

/// Exchanges `code` using the verifier saved by the last `daysync auth`.
///
/// This lets a code copied from the browser be finished from another
/// terminal after the original prompt was abandoned.
pub async fn run(auth: &GoogleAuth, code: &str) -> ClientResult<()> {
    let stored = auth.complete_with_code(code).await?;
    info!(expires_at = ?stored.expires_at, "authorization code exchanged");
    println!("Connected to Google Calendar.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use daysync_google::{AuthConfig, GoogleErrorCode, LocalFallbackStore, TokenStore};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::ClientError;

    fn auth(server: &MockServer, dir: &std::path::Path) -> GoogleAuth {
        let config = AuthConfig::new("client-id")
            .unwrap()
            .with_token_url(&format!("{}/token", server.uri()))
            .unwrap();
        let store = TokenStore::new(Arc::new(LocalFallbackStore::new(dir)));
        GoogleAuth::new(config, store).unwrap()
    }

    #[tokio::test]
    async fn exchanges_with_stored_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=pasted"))
            .and(body_string_contains("code_verifier=saved-verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let auth = auth(&server, dir.path());
        auth.store().put_verifier("saved-verifier").unwrap();

        run(&auth, "  pasted\n").await.unwrap();

        assert_eq!(auth.store().load().unwrap().token.access_token, "fresh");
        assert!(auth.store().verifier().is_none());
    }

    #[tokio::test]
    async fn fails_without_a_pending_attempt() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = run(&auth(&server, dir.path()), "pasted").await.unwrap_err();
        match err {
            ClientError::Google(e) => assert_eq!(e.code(), GoogleErrorCode::MissingVerifier),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
