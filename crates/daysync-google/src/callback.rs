//! Loopback listener for the OAuth redirect.
//!
//! When the redirect URI points at this machine, the consent page redirects
//! the browser here with `?code=...&state=...`. The redirect page may also
//! `POST /message` with a [`CodeMessage`] body. Both routes hand the code to
//! the attempt's [`AuthSession`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GoogleError, GoogleResult};
use crate::session::{AuthSession, CodeMessage};

/// Largest request body accepted on `/message`.
const MAX_BODY_BYTES: usize = 16 * 1024;

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization Successful</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";

/// A running callback listener. Dropping it stops the listener.
#[derive(Debug)]
pub struct CallbackServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Binds `127.0.0.1:port` and serves redirects at `callback_path` for
    /// `session`.
    pub async fn bind(
        port: u16,
        callback_path: impl Into<String>,
        session: Arc<AuthSession>,
    ) -> GoogleResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            GoogleError::configuration(format!(
                "failed to bind callback listener on port {}: {}",
                port, e
            ))
            .with_source(e)
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            GoogleError::internal(format!("failed to read listener address: {}", e))
        })?;

        info!(%local_addr, attempt = %session.id(), "callback listener started");
        let task = tokio::spawn(accept_loop(listener, callback_path.into(), session));
        Ok(Self { local_addr, task })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the listener.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, callback_path: String, session: Arc<AuthSession>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "callback connection");
                let session = Arc::clone(&session);
                let callback_path = callback_path.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &callback_path, &session).await {
                        debug!(error = %e, "callback connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept callback connection");
            }
        }
    }
}

/// What the listener answers.
struct Reply {
    status: &'static str,
    content_type: &'static str,
    body: String,
}

impl Reply {
    fn html(status: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn json(status: &'static str, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    callback_path: &str,
    session: &AuthSession,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        let n = reader.read_line(&mut header).await?;
        let header = header.trim_end();
        if n == 0 || header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let reply = match parts.as_slice() {
        [method, target, ..] => {
            let (path, query) = target.split_once('?').unwrap_or((*target, ""));
            match *method {
                "GET" if path == callback_path => handle_redirect(query, session),
                "POST" if path == "/message" => {
                    let mut body = vec![0u8; content_length.min(MAX_BODY_BYTES)];
                    reader.read_exact(&mut body).await?;
                    handle_message(&String::from_utf8_lossy(&body), session)
                }
                _ => Reply::json("404 Not Found", serde_json::json!({"error": "not_found"})),
            }
        }
        _ => Reply::json("400 Bad Request", serde_json::json!({"error": "bad_request"})),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.content_type,
        reply.body.len(),
        reply.body
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

fn handle_redirect(query: &str, session: &AuthSession) -> Reply {
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(session.id().to_string().as_str()) {
        warn!(
            attempt = %session.id(),
            has_state = state.is_some(),
            "redirect without this attempt's state, ignoring it"
        );
        return Reply::html("400 Bad Request", FAILURE_PAGE);
    }

    if let Some(error) = error {
        warn!(%error, "authorization denied");
        return Reply::html("400 Bad Request", FAILURE_PAGE);
    }

    let Some(code) = code else {
        return Reply::html("400 Bad Request", FAILURE_PAGE);
    };
    if session.deliver(code) {
        info!(attempt = %session.id(), "authorization code received");
        Reply::html("200 OK", SUCCESS_PAGE)
    } else {
        Reply::html("409 Conflict", FAILURE_PAGE)
    }
}

fn handle_message(body: &str, session: &AuthSession) -> Reply {
    let Some(code) = CodeMessage::parse_code(body) else {
        return Reply::json(
            "400 Bad Request",
            serde_json::json!({"error": "invalid_message"}),
        );
    };

    if session.deliver(code) {
        info!(attempt = %session.id(), "authorization code received by message");
        Reply::json("200 OK", serde_json::json!({"delivered": true}))
    } else {
        Reply::json("409 Conflict", serde_json::json!({"delivered": false}))
    }
}
