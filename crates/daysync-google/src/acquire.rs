//! Authorization code acquisition.
//!
//! The consent page is opened through a [`Launcher`]. The code comes back
//! either as a message delivered to the attempt's [`AuthSession`] (for
//! example by the loopback callback listener) or, when that does not happen,
//! from the user pasting it into a [`CodePrompt`].
//!
//! ```text
//! idle ─▶ awaiting_code ─┬─▶ code_received ───────────────┐
//!                        │                                ▼
//!                        └─▶ awaiting_manual_code ─────▶ resolved
//! ```

use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

use crate::BoxFuture;
use crate::config::AuthConfig;
use crate::session::{AcquireState, AuthSession, AuthStatus};

/// How often the opened browsing context is checked for being closed.
pub const POPUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Delay before the manual prompt is shown on the fallback path.
pub const MANUAL_PROMPT_DELAY: Duration = Duration::from_millis(100);

/// How long a system browser tab is considered open.
pub const DEFAULT_CALLBACK_WINDOW: Duration = Duration::from_secs(300);

/// A browsing context opened on the consent page.
pub trait PopupHandle: Send {
    /// Returns true once the context is gone.
    fn is_closed(&self) -> bool;

    /// Closes the context, if possible.
    fn close(&mut self);
}

/// Opens the consent page.
pub trait Launcher: Send + Sync {
    /// Opens `url`. Returns `None` when no trackable context could be
    /// opened (blocked, no browser).
    fn open(&self, url: &Url) -> Option<Box<dyn PopupHandle>>;
}

/// Asks the user to paste an authorization code.
pub trait CodePrompt: Send + Sync {
    /// Prompts for a code. `None` or an empty answer means no code was
    /// pasted.
    fn prompt<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Option<String>>;
}

/// Builds the consent page URL for one attempt.
///
/// `state` carries the attempt id so that a redirect can be matched to the
/// attempt that started it.
pub fn build_auth_url(config: &AuthConfig, challenge: &str, state: &str) -> Url {
    let mut url = config.auth_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("access_type", "offline")
        .append_pair("state", state);
    url
}

/// Runs the primary and fallback paths for one attempt.
pub struct CodeAcquirer<'a> {
    launcher: &'a dyn Launcher,
    prompt: &'a dyn CodePrompt,
    primary: bool,
    poll_interval: Duration,
    prompt_delay: Duration,
}

impl<'a> CodeAcquirer<'a> {
    pub fn new(launcher: &'a dyn Launcher, prompt: &'a dyn CodePrompt) -> Self {
        Self {
            launcher,
            prompt,
            primary: true,
            poll_interval: POPUP_POLL_INTERVAL,
            prompt_delay: MANUAL_PROMPT_DELAY,
        }
    }

    /// Builder: enable or skip the message-based primary path.
    ///
    /// Skip it when nothing can deliver a code message, e.g. with an
    /// out-of-band redirect. An empty paste then ends the attempt.
    pub fn with_primary(mut self, enabled: bool) -> Self {
        self.primary = enabled;
        self
    }

    /// Builder: set the closed-context poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder: set the delay before the manual prompt.
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }

    /// Obtains an authorization code for `session`.
    ///
    /// Returns `None` when the user abandons the attempt or the session is
    /// cancelled. Abandonment is not an error.
    pub async fn acquire(&self, session: &AuthSession, url: &Url) -> Option<String> {
        session.emit(AuthStatus::AwaitingCode);

        if self.primary {
            let rx = session.arm(AcquireState::AwaitingCode);
            if let Some(code) = self.wait_primary(session, url, rx).await {
                session.resolve();
                return Some(code);
            }
        }

        if session.is_cancelled() {
            session.resolve();
            return None;
        }

        let code = self.wait_fallback(session, url).await;
        session.resolve();
        code
    }

    async fn wait_primary(
        &self,
        session: &AuthSession,
        url: &Url,
        mut rx: oneshot::Receiver<Option<String>>,
    ) -> Option<String> {
        let Some(mut popup) = self.launcher.open(url) else {
            debug!(attempt = %session.id(), "consent page could not be opened");
            session.disarm();
            return None;
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                result = &mut rx => {
                    popup.close();
                    return result.ok().flatten();
                }
                _ = ticker.tick() => {
                    if popup.is_closed() {
                        debug!(attempt = %session.id(), "consent page closed before a code arrived");
                        session.disarm();
                        return None;
                    }
                }
            }
        }
    }

    async fn wait_fallback(&self, session: &AuthSession, url: &Url) -> Option<String> {
        let mut rx = session.arm(AcquireState::AwaitingManualCode);
        if session.is_cancelled() {
            return None;
        }

        // The returned handle is not tracked on this path.
        let _ = self.launcher.open(url);
        session.emit(AuthStatus::AwaitingManualCode);
        info!(attempt = %session.id(), "waiting for the authorization code to be pasted");

        let manual = async {
            tokio::time::sleep(self.prompt_delay).await;
            self.prompt.prompt(url).await
        };
        tokio::pin!(manual);
        let mut prompted = false;

        loop {
            tokio::select! {
                biased;
                result = &mut rx => return result.ok().flatten(),
                pasted = &mut manual, if !prompted => {
                    prompted = true;
                    let pasted = pasted
                        .map(|code| code.trim().to_string())
                        .filter(|code| !code.is_empty());
                    match pasted {
                        // The session decides between this paste and a
                        // message that got there first.
                        Some(code) => {
                            session.deliver(code);
                        }
                        // Without a message path nothing else can deliver.
                        None if !self.primary => {
                            debug!(attempt = %session.id(), "nothing pasted and no code message path");
                            return None;
                        }
                        None => debug!(attempt = %session.id(), "nothing pasted, still waiting for a code message"),
                    }
                }
            }
        }
    }
}

/// Opens the consent page in the system browser.
///
/// A browser tab cannot be observed, so the handle reports itself closed
/// once the callback window has elapsed.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    callback_window: Duration,
}

impl BrowserLauncher {
    pub fn new() -> Self {
        Self {
            callback_window: DEFAULT_CALLBACK_WINDOW,
        }
    }

    /// Builder: set how long to wait for a callback.
    pub fn with_callback_window(mut self, window: Duration) -> Self {
        self.callback_window = window;
        self
    }
}

impl Default for BrowserLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for BrowserLauncher {
    fn open(&self, url: &Url) -> Option<Box<dyn PopupHandle>> {
        info!("opening browser for Google authorization");
        match open::that(url.as_str()) {
            Ok(()) => Some(Box::new(BrowserTab {
                deadline: Instant::now() + self.callback_window,
                closed: false,
            })),
            Err(e) => {
                warn!(error = %e, "failed to open browser");
                eprintln!("\nPlease open this URL in your browser:\n\n{}\n", url);
                None
            }
        }
    }
}

struct BrowserTab {
    deadline: Instant,
    closed: bool,
}

impl PopupHandle for BrowserTab {
    fn is_closed(&self) -> bool {
        self.closed || Instant::now() >= self.deadline
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Reads a pasted code from standard input.
#[derive(Debug, Clone, Default)]
pub struct StdinPrompt;

impl CodePrompt for StdinPrompt {
    fn prompt<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Option<String>> {
        let url = url.to_string();
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            // A detached thread: a pending stdin read must not keep the
            // runtime alive once a code message has won.
            std::thread::spawn(move || {
                let mut stderr = std::io::stderr();
                let _ = writeln!(
                    stderr,
                    "\nIf the browser did not open, visit:\n\n{}\n\nAfter granting access, paste the authorization code here:",
                    url
                );
                let _ = stderr.flush();

                let mut line = String::new();
                let read = std::io::stdin().lock().read_line(&mut line);
                let _ = tx.send(read.ok().filter(|n| *n > 0).map(|_| line));
            });
            rx.await.ok().flatten()
        })
    }
}
