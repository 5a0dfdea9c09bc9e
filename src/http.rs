//! HTTP backend
//!
//! `HttpRecordApi` talks to a JSON REST backend with reqwest. Each client
//! keeps its own cookie jar, seeded from the browser's `Cookie` header for
//! per-connection instances, so backend session cookies are never shared
//! between users. Every request is bounded by the configured timeout.

use crate::api::{ApiResponse, ListParams, RecordApi, RecordPage, RouteStyle};
use crate::error::TableError;
use crate::record::{FieldValue, Record, RecordId};
use crate::session::{SessionApi, SessionStatus};
use log::{debug, error};
use reqwest::cookie::Jar;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SESSION_PATH: &str = "auth/session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Get => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Method and URL of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: Method,
    pub url: Url,
}

pub struct HttpRecordApi {
    client: reqwest::Client,
    base: Url,
    style: RouteStyle,
    session_path: String,
    timeout: Duration,
}

fn build_client(jar: Arc<Jar>, timeout: Duration) -> Result<reqwest::Client, TableError> {
    reqwest::Client::builder()
        .cookie_provider(jar)
        .timeout(timeout)
        .build()
        .map_err(|e| TableError::Config(format!("failed to build http client: {}", e)))
}

impl HttpRecordApi {
    pub fn new(base: &str, style: RouteStyle, timeout: Duration) -> Result<Self, TableError> {
        let base = Url::parse(base)
            .map_err(|e| TableError::Config(format!("invalid api base '{}': {}", base, e)))?;
        if base.cannot_be_a_base() {
            return Err(TableError::Config(format!("api base '{}' cannot hold paths", base)));
        }
        let client = build_client(Arc::new(Jar::default()), timeout)?;

        Ok(HttpRecordApi {
            client,
            base,
            style,
            session_path: DEFAULT_SESSION_PATH.to_string(),
            timeout,
        })
    }

    /// Same backend, fresh cookie jar holding the cookies of one browser
    /// session (`name=value; name2=value2`, as sent in a `Cookie` header).
    pub fn for_session(&self, cookie_header: Option<&str>) -> Result<Self, TableError> {
        let jar = Jar::default();
        for pair in cookie_header
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|p| p.contains('='))
        {
            jar.add_cookie_str(&format!("{}; Path=/", pair), &self.base);
        }

        Ok(HttpRecordApi {
            client: build_client(Arc::new(jar), self.timeout)?,
            base: self.base.clone(),
            style: self.style,
            session_path: self.session_path.clone(),
            timeout: self.timeout,
        })
    }

    pub fn with_session_path(mut self, path: impl Into<String>) -> Self {
        self.session_path = path.into();
        self
    }

    pub fn route_style(&self) -> RouteStyle {
        self.style
    }

    fn url(&self, segments: &[&str], query: &[(String, String)]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn endpoint(&self, entity: &str, action: Action, id: Option<&RecordId>, query: &[(String, String)]) -> Endpoint {
        match self.style {
            RouteStyle::Rest => {
                let method = match action {
                    Action::List | Action::Get => Method::GET,
                    Action::Create => Method::POST,
                    Action::Update => Method::PUT,
                    Action::Delete => Method::DELETE,
                };
                let url = match id {
                    Some(id) => self.url(&[entity, id.as_str()], query),
                    None => self.url(&[entity], query),
                };
                Endpoint { method, url }
            }
            RouteStyle::ActionQuery => {
                let method = match action {
                    Action::List | Action::Get => Method::GET,
                    Action::Create | Action::Update | Action::Delete => Method::POST,
                };
                let mut pairs = vec![("action".to_string(), action.as_str().to_string())];
                if let Some(id) = id {
                    pairs.push(("id".to_string(), id.as_str().to_string()));
                }
                pairs.extend(query.iter().cloned());
                let script = format!("{}.php", entity);
                Endpoint {
                    method,
                    url: self.url(&[&script], &pairs),
                }
            }
        }
    }

    fn session_endpoint(&self) -> Endpoint {
        let segments: Vec<&str> = self.session_path.split('/').filter(|s| !s.is_empty()).collect();
        Endpoint {
            method: Method::GET,
            url: self.url(&segments, &[]),
        }
    }

    /// Status code and raw body of one request
    async fn fetch(&self, endpoint: Endpoint, body: Option<&Record>) -> Result<(u16, String), TableError> {
        debug!("{} {}", endpoint.method, endpoint.url);
        let mut request = self.client.request(endpoint.method.clone(), endpoint.url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = execute(request).await;
        if let Err(e) = &result {
            error!("{} {} failed: {}", endpoint.method, endpoint.url, e);
        }
        result
    }

    async fn send(&self, endpoint: Endpoint, body: Option<&Record>) -> Result<ApiResponse<JsonValue>, TableError> {
        let (status, text) = self.fetch(endpoint, body).await?;
        parse_envelope(status, &text)
    }
}

async fn execute(request: reqwest::RequestBuilder) -> Result<(u16, String), TableError> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    Ok((status, text))
}

/// Maps a session-check response to a status.
///
/// 401/403 and a well-formed `success: false` mean the session is gone.
/// Anything else that is not a valid envelope is a failed check, not an
/// expiry.
pub fn session_status(status: u16, body: &str) -> Result<SessionStatus, TableError> {
    if status == 401 || status == 403 {
        return Ok(SessionStatus::Expired);
    }
    if (200..300).contains(&status) {
        if let Ok(response) = serde_json::from_str::<ApiResponse<JsonValue>>(body) {
            return Ok(if response.success {
                SessionStatus::Valid
            } else {
                SessionStatus::Expired
            });
        }
    }
    parse_envelope::<JsonValue>(status, body).map(|_| SessionStatus::Valid)
}

/// `data.role`, or `data.user.role`, of a session payload
fn role_of(data: &JsonValue) -> Option<String> {
    data.get("role")
        .or_else(|| data.get("user").and_then(|u| u.get("role")))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

/// Interprets a response body as an envelope.
///
/// Non-2xx statuses and `success: false` are application errors carrying
/// the server's message when it sent one.
pub fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<ApiResponse<T>, TableError> {
    let parsed = serde_json::from_str::<ApiResponse<T>>(body);

    if !(200..300).contains(&status) {
        let message = parsed
            .ok()
            .and_then(|r| r.message)
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        return Err(TableError::Application {
            status: Some(status),
            message,
        });
    }

    let response = parsed.map_err(|e| TableError::Application {
        status: Some(status),
        message: format!("Invalid response from server: {}", e),
    })?;
    if !response.success {
        return Err(TableError::Application {
            status: Some(status),
            message: response.message.unwrap_or_else(|| "Request failed".to_string()),
        });
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(data: JsonValue) -> Result<T, TableError> {
    serde_json::from_value(data)
        .map_err(|e| TableError::application(format!("Invalid response from server: {}", e)))
}

/// A returned record, if the backend echoed one (some only return an id)
fn echoed_record(data: Option<JsonValue>) -> Option<Record> {
    match data {
        Some(JsonValue::Object(map)) => Some(map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect()),
        _ => None,
    }
}

impl RecordApi for HttpRecordApi {
    async fn list(&self, entity: &str, params: &ListParams) -> Result<RecordPage, TableError> {
        let endpoint = self.endpoint(entity, Action::List, None, &params.to_query());
        let response = self.send(endpoint, None).await?;

        let records: Vec<Record> = match response.data {
            Some(data) => decode(data)?,
            None => Vec::new(),
        };
        let total = response
            .total
            .map(|t| t as usize)
            .unwrap_or(records.len());
        Ok(RecordPage { records, total })
    }

    async fn get(&self, entity: &str, id: &RecordId) -> Result<Record, TableError> {
        let endpoint = self.endpoint(entity, Action::Get, Some(id), &[]);
        let response = self.send(endpoint, None).await?;
        match response.data {
            Some(data) => decode(data),
            None => Err(TableError::Application {
                status: Some(404),
                message: "Record not found".to_string(),
            }),
        }
    }

    async fn create(&self, entity: &str, fields: &Record) -> Result<Option<Record>, TableError> {
        let endpoint = self.endpoint(entity, Action::Create, None, &[]);
        let response = self.send(endpoint, Some(fields)).await?;
        Ok(echoed_record(response.data))
    }

    async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        fields: &Record,
    ) -> Result<Option<Record>, TableError> {
        let endpoint = self.endpoint(entity, Action::Update, Some(id), &[]);
        let response = self.send(endpoint, Some(fields)).await?;
        Ok(echoed_record(response.data))
    }

    async fn delete(&self, entity: &str, id: &RecordId) -> Result<(), TableError> {
        let endpoint = self.endpoint(entity, Action::Delete, Some(id), &[]);
        self.send(endpoint, None).await.map(|_| ())
    }
}

impl SessionApi for HttpRecordApi {
    async fn check_session(&self) -> Result<SessionStatus, TableError> {
        let (status, body) = self.fetch(self.session_endpoint(), None).await?;
        session_status(status, &body)
    }

    async fn session_role(&self) -> Result<Option<String>, TableError> {
        let response = self.send(self.session_endpoint(), None).await?;
        Ok(response.data.as_ref().and_then(role_of))
    }
}
