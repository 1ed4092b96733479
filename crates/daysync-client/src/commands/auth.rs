//! Interactive Google authorization.

use tokio::sync::watch;
use tracing::{debug, info};
use url::Url;

use daysync_google::{
    AuthStatus, BrowserLauncher, CallbackServer, CodeAcquirer, GoogleAuth, StdinPrompt,
};

use crate::error::ClientResult;

/// Connects a Google account.
///
/// With a loopback redirect URI a local listener receives the redirect and
/// the pasted code is only a fallback. Otherwise the user pastes the code
/// shown by Google.
pub async fn run(auth: &GoogleAuth, force: bool) -> ClientResult<()> {
    if auth.is_connected() && !force {
        println!("Already connected to Google Calendar.");
        println!("Use --force to re-authorize.");
        return Ok(());
    }

    let session = auth.begin_auth();
    let callback = match auth.config().loopback_port() {
        Some(port) => {
            let path = callback_path(&auth.config().redirect_uri);
            match CallbackServer::bind(port, path, session.clone()).await {
                Ok(server) => Some(server),
                Err(e) => {
                    auth.abandon_auth(&session);
                    return Err(e.into());
                }
            }
        }
        None => None,
    };
    let status = tokio::spawn(report_status(session.subscribe()));

    let launcher = BrowserLauncher::new();
    let prompt = StdinPrompt;
    let acquirer = CodeAcquirer::new(&launcher, &prompt).with_primary(callback.is_some());

    println!("Opening Google authorization in your browser...");
    let result = auth.run_auth(&session, &acquirer).await;

    if let Some(server) = callback {
        server.shutdown();
    }
    let _ = status.await;

    let stored = result?;
    info!(expires_at = ?stored.expires_at, "authorization complete");
    println!("Connected to Google Calendar.");
    Ok(())
}

/// Path of the redirect URI the listener serves.
pub(crate) fn callback_path(redirect_uri: &str) -> String {
    Url::parse(redirect_uri)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

/// Progress line for a status change, if the user should see one.
pub(crate) fn status_line(status: &AuthStatus) -> Option<String> {
    match status {
        AuthStatus::Idle | AuthStatus::AwaitingManualCode | AuthStatus::Connected => None,
        AuthStatus::AwaitingCode => Some("Waiting for the browser redirect...".to_string()),
        AuthStatus::Exchanging => Some("Exchanging authorization code...".to_string()),
        AuthStatus::Error { message } => Some(format!("Authorization failed: {}", message)),
    }
}

async fn report_status(mut rx: watch::Receiver<AuthStatus>) {
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().clone();
        debug!(?status, "auth status");
        if let Some(line) = status_line(&status) {
            eprintln!("{}", line);
        }
        if status.is_terminal() {
            break;
        }
    }
}
