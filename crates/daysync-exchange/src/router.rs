//! HTTP routes for the delegated token exchange.
//!
//! `POST /exchange` accepts `{code, redirect_uri?, code_verifier?}`, adds the
//! confidential client credentials, forwards the form to the provider token
//! endpoint and relays the provider response.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ExchangeResult};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<ExchangeConfig>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: ExchangeConfig) -> ExchangeResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("daysync-exchange/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExchangeRequest {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    code_verifier: Option<String>,
}

/// Builds the application router.
pub fn router(state: AppState) -> ExchangeResult<Router> {
    let origin = HeaderValue::from_str(&state.config.allowed_origin).map_err(|_| {
        ExchangeError::config(format!(
            "invalid allowed origin '{}'",
            state.config.allowed_origin
        ))
    })?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(Router::new()
        .route("/exchange", post(exchange).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

async fn exchange(State(state): State<AppState>, body: Bytes) -> Result<Response, ExchangeError> {
    let request: ExchangeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ExchangeRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let Some(code) = request.code.filter(|c| !c.is_empty()) else {
        debug!("exchange request without code");
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing_code" })),
        )
            .into_response());
    };

    let config = state.config();
    let redirect_uri = request
        .redirect_uri
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| config.redirect_uri.clone());

    let mut form: Vec<(&str, &str)> = vec![
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ];
    if let Some(verifier) = request.code_verifier.as_deref().filter(|v| !v.is_empty()) {
        form.push(("code_verifier", verifier));
    }

    let upstream = state
        .http
        .post(config.token_url.clone())
        .form(&form)
        .send()
        .await?;

    let ok = upstream.status().is_success();
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    info!(upstream = %upstream.status(), "token endpoint responded");

    let text = upstream.text().await?;
    let response = match serde_json::from_str::<Value>(&text) {
        Ok(value) => (status, Json(value)).into_response(),
        Err(_) => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app(token_url: &str) -> Router {
        let config = ExchangeConfig::new("server-id", "server-secret")
            .unwrap()
            .with_token_url(token_url)
            .unwrap();
        router(AppState::new(config).unwrap()).unwrap()
    }

    fn post_exchange(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/exchange")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_code_is_bad_request() {
        let response = app("http://127.0.0.1:9/token")
            .oneshot(post_exchange(r#"{"redirect_uri":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body, json!({ "error": "missing_code" }));
    }

    #[tokio::test]
    async fn empty_body_is_missing_code() {
        let response = app("http://127.0.0.1:9/token")
            .oneshot(post_exchange(""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_json_is_server_error() {
        let response = app("http://127.0.0.1:9/token")
            .oneshot(post_exchange("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["error"], "server_error");
        assert!(body["message"].as_str().unwrap().contains("invalid request body"));
    }

    #[tokio::test]
    async fn forwards_credentials_and_relays_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_id=server-id"))
            .and(body_string_contains("client_secret=server-secret"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2Flocalhost%3A5173%2Foauth2callback.html",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = app(&format!("{}/token", server.uri()))
            .oneshot(post_exchange(
                r#"{"code":"auth-code","code_verifier":"verifier-1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["access_token"], "at");
        assert_eq!(body["refresh_token"], "rt");
    }

    #[tokio::test]
    async fn request_redirect_uri_wins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2F127.0.0.1%3A8765%2Fcallback",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at" })))
            .expect(1)
            .mount(&server)
            .await;

        let response = app(&format!("{}/token", server.uri()))
            .oneshot(post_exchange(
                r#"{"code":"c","redirect_uri":"http://127.0.0.1:8765/callback"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn provider_error_becomes_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let response = app(&format!("{}/token", server.uri()))
            .oneshot(post_exchange(r#"{"code":"stale"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn non_json_provider_body_is_relayed_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let response = app(&format!("{}/token", server.uri()))
            .oneshot(post_exchange(r#"{"code":"c"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        assert_eq!(read_body(response).await, "upstream down");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/token")
            .body(Body::empty())
            .unwrap();
        let response = app("http://127.0.0.1:9/token").oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_body(response).await, "Not found");
    }

    #[tokio::test]
    async fn get_exchange_is_not_found() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/exchange")
            .body(Body::empty())
            .unwrap();
        let response = app("http://127.0.0.1:9/token").oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preflight_allows_configured_origin() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/exchange")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app("http://127.0.0.1:9/token").oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("POST"));
    }

    #[tokio::test]
    async fn other_origins_get_no_cors_header() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/exchange")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::from("{}"))
            .unwrap();
        let response = app("http://127.0.0.1:9/token").oneshot(request).await.unwrap();
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
}
