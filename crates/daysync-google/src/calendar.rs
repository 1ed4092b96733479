//! Google Calendar API client.
//!
//! Every request asks an [`AccessTokenSource`] for a bearer token first; with
//! no token available the call fails with a `not_authenticated` error before
//! touching the network.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use daysync_core::{EventInput, UNTITLED_EVENT};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;
use crate::auth::GoogleAuth;
use crate::error::{GoogleError, GoogleResult};

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar used when none is configured.
pub const DEFAULT_CALENDAR_ID: &str = "primary";

/// Supplies bearer tokens for API calls.
pub trait AccessTokenSource: Send + Sync {
    /// Returns a usable access token, or `None` when not connected.
    fn access_token(&self) -> BoxFuture<'_, Option<String>>;
}

impl AccessTokenSource for GoogleAuth {
    fn access_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(self.get_access_token())
    }
}

/// Google Calendar API client.
#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
    base_url: String,
}

impl std::fmt::Debug for CalendarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CalendarClient {
    /// Creates a client using `tokens` for authentication.
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> GoogleResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("daysync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GoogleError::internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            tokens,
            base_url: CALENDAR_API_BASE.to_string(),
        })
    }

    /// Builder: point the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Lists events of `calendar_id`, recurring events expanded into
    /// instances and ordered by start time.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: Option<DateTime<Utc>>,
    ) -> GoogleResult<Vec<EventInput>> {
        let url = self.events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(time_min) = time_min {
                query.push(("timeMin", time_min.to_rfc3339()));
            }
            query.push(("singleEvents", "true".to_string()));
            query.push(("orderBy", "startTime".to_string()));
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let token = self.bearer().await?;
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(request_failed)?;
            let body = read_success(response, "Google API error").await?;

            let page: EventListResponse = serde_json::from_str(&body).map_err(|e| {
                GoogleError::invalid_response(format!("failed to parse event list: {}", e))
                    .with_body(&body)
            })?;
            events.extend(page.items.into_iter().map(ApiEvent::into_event_input));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar_id, count = events.len(), "fetched events");
        Ok(events)
    }

    /// Updates `event` when it has an id, otherwise creates it.
    ///
    /// Returns the event as stored by the provider.
    pub async fn create_or_update_event(
        &self,
        event: &EventInput,
        calendar_id: &str,
    ) -> GoogleResult<EventInput> {
        let body = EventWriteBody::from(event);
        let (method, url) = match event.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => (Method::PATCH, self.event_url(calendar_id, id)),
            None => (Method::POST, self.events_url(calendar_id)),
        };

        let token = self.bearer().await?;
        debug!(%method, calendar_id, "writing event");
        let response = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(request_failed)?;
        let text = read_success(response, "Google API error").await?;

        let created: ApiEvent = serde_json::from_str(&text).map_err(|e| {
            GoogleError::invalid_response(format!("failed to parse event: {}", e)).with_body(&text)
        })?;
        Ok(created.into_event_input())
    }

    /// Deletes an event.
    pub async fn delete_event(&self, event_id: &str, calendar_id: &str) -> GoogleResult<()> {
        let url = self.event_url(calendar_id, event_id);
        let token = self.bearer().await?;
        let response = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_failed)?;
        read_success(response, "Google API delete error").await?;
        debug!(calendar_id, event_id, "deleted event");
        Ok(())
    }

    async fn bearer(&self) -> GoogleResult<String> {
        self.tokens
            .access_token()
            .await
            .ok_or_else(GoogleError::not_authenticated)
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }
}

fn request_failed(e: reqwest::Error) -> GoogleError {
    if e.is_timeout() {
        GoogleError::network("request timeout")
    } else if e.is_connect() {
        GoogleError::network(format!("connection failed: {}", e))
    } else {
        GoogleError::network(format!("request failed: {}", e))
    }
}

/// Returns the body of a success response, or an API error with the status
/// and the leading part of the body.
async fn read_success(response: reqwest::Response, prefix: &str) -> GoogleResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GoogleError::network(format!("failed to read response: {}", e)))?;

    if !status.is_success() {
        return Err(api_error(prefix, status, &body));
    }
    Ok(body)
}

fn api_error(prefix: &str, status: StatusCode, body: &str) -> GoogleError {
    GoogleError::api(format!("{} {}", prefix, status.as_u16()))
        .with_status(status.as_u16())
        .with_body(body)
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// An event resource, reduced to the fields that are mapped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    recurring_event_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: Option<ApiEventTime>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl ApiEventTime {
    /// `dateTime`, else `date`. Empty values count as absent.
    fn value(self) -> Option<String> {
        non_empty(self.date_time).or_else(|| non_empty(self.date))
    }
}

impl ApiEvent {
    fn into_event_input(self) -> EventInput {
        EventInput {
            id: non_empty(self.id),
            recurring_event_id: non_empty(self.recurring_event_id),
            title: non_empty(self.summary).unwrap_or_else(|| UNTITLED_EVENT.to_string()),
            start: self.start.value().unwrap_or_default(),
            end: self.end.and_then(ApiEventTime::value),
            description: non_empty(self.description),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Body of an event create or patch.
#[derive(Debug, Serialize)]
struct EventWriteBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: ApiEventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<ApiEventTime>,
}

impl<'a> From<&'a EventInput> for EventWriteBody<'a> {
    fn from(event: &'a EventInput) -> Self {
        let date_time = |value: &str| ApiEventTime {
            date_time: Some(value.to_string()),
            date: None,
        };
        Self {
            summary: &event.title,
            description: event.description.as_deref(),
            start: date_time(&event.start),
            end: event.end.as_deref().map(date_time),
        }
    }
}
