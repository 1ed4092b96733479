//! Per-attempt authorization state.
//!
//! Every call to start an authorization creates an [`AuthSession`] with its
//! own id, state, one-shot code resolver and status channel. Sessions are
//! registered in a [`SessionRegistry`] so that codes delivered from outside
//! (loopback callback, manual paste) reach the attempt they belong to and no
//! other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tracing::debug;
use uuid::Uuid;

/// `type` of the message carrying an authorization code.
pub const CODE_MESSAGE_TYPE: &str = "logseq_gcal_code";

/// Message posted by the redirect page with the authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
}

impl CodeMessage {
    /// Creates a code message.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            kind: CODE_MESSAGE_TYPE.to_string(),
            code: code.into(),
        }
    }

    /// Extracts the code from a JSON message, ignoring anything that is not
    /// a well-formed code message.
    pub fn parse_code(raw: &str) -> Option<String> {
        let message: CodeMessage = serde_json::from_str(raw).ok()?;
        (message.kind == CODE_MESSAGE_TYPE).then_some(message.code)
    }
}

/// Progress of the code acquisition for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    Idle,
    AwaitingCode,
    CodeReceived,
    AwaitingManualCode,
    Resolved,
}

/// User-visible status of an authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthStatus {
    Idle,
    AwaitingCode,
    AwaitingManualCode,
    Exchanging,
    Connected,
    Error { message: String },
}

impl AuthStatus {
    /// Returns true for `Connected` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected | Self::Error { .. })
    }
}

type Resolver = oneshot::Sender<Option<String>>;

/// State of a single authorization attempt.
#[derive(Debug)]
pub struct AuthSession {
    id: Uuid,
    state: Mutex<AcquireState>,
    resolver: Mutex<Option<Resolver>>,
    cancelled: AtomicBool,
    status: watch::Sender<AuthStatus>,
}

impl AuthSession {
    /// Creates an idle session with a fresh id.
    pub fn new() -> Self {
        let (status, _) = watch::channel(AuthStatus::Idle);
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(AcquireState::Idle),
            resolver: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            status,
        }
    }

    /// Returns the attempt id, also sent as the OAuth `state` parameter.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the acquisition state.
    pub fn state(&self) -> AcquireState {
        *lock(&self.state)
    }

    fn set_state(&self, state: AcquireState) {
        *lock(&self.state) = state;
        debug!(attempt = %self.id, ?state, "acquire state changed");
    }

    /// Returns the latest status.
    pub fn status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    /// Publishes a status change.
    pub fn emit(&self, status: AuthStatus) {
        debug!(attempt = %self.id, ?status, "auth status");
        self.status.send_replace(status);
    }

    /// Installs a fresh resolver and moves to `state`.
    ///
    /// Any previous resolver is dropped, which resolves its receiver to no
    /// code.
    pub(crate) fn arm(&self, state: AcquireState) -> oneshot::Receiver<Option<String>> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.resolver) = Some(tx);
        self.set_state(state);
        rx
    }

    /// Drops the pending resolver without resolving it.
    pub(crate) fn disarm(&self) {
        lock(&self.resolver).take();
    }

    /// Returns true while a resolver is waiting for a code.
    pub fn is_waiting(&self) -> bool {
        lock(&self.resolver).is_some()
    }

    /// Delivers an authorization code.
    ///
    /// Only the first delivery while a resolver is armed is accepted;
    /// later ones return false.
    pub fn deliver(&self, code: impl Into<String>) -> bool {
        let Some(resolver) = lock(&self.resolver).take() else {
            debug!(attempt = %self.id, "code delivered with no pending resolver");
            return false;
        };
        if resolver.send(Some(code.into())).is_err() {
            return false;
        }
        self.set_state(AcquireState::CodeReceived);
        true
    }

    /// Abandons the attempt: the waiting flow ends with no code.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(resolver) = lock(&self.resolver).take() {
            let _ = resolver.send(None);
        }
        debug!(attempt = %self.id, "attempt cancelled");
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the acquisition as finished.
    pub(crate) fn resolve(&self) {
        self.disarm();
        self.set_state(AcquireState::Resolved);
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Live authorization attempts, keyed by attempt id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<AuthSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a new session.
    pub fn begin(&self) -> Arc<AuthSession> {
        let session = Arc::new(AuthSession::new());
        lock(&self.sessions).insert(session.id(), Arc::clone(&session));
        session
    }

    /// Looks up a live session.
    pub fn get(&self, id: &Uuid) -> Option<Arc<AuthSession>> {
        lock(&self.sessions).get(id).cloned()
    }

    /// Delivers a code to the session `id`. Unknown or finished attempts
    /// reject the code.
    pub fn deliver(&self, id: &Uuid, code: impl Into<String>) -> bool {
        match self.get(id) {
            Some(session) => session.deliver(code),
            None => {
                debug!(attempt = %id, "code delivered for unknown attempt");
                false
            }
        }
    }

    /// Unregisters a session.
    pub fn finish(&self, id: &Uuid) {
        lock(&self.sessions).remove(id);
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
