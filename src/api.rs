//! Record API abstraction
//!
//! Tables talk to their backend through `RecordApi`, one implementation per
//! transport. Every backend answers with the same envelope:
//!
//! ```json
//! { "success": true, "data": [...], "total": 25, "message": null }
//! ```

use crate::error::TableError;
use crate::http::HttpRecordApi;
use crate::memory::MemoryRecordApi;
use crate::record::{Record, RecordId};
use crate::session::{SessionApi, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

/// Response envelope shared by all endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Absent means success; only an explicit `false` marks failure
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    pub total: Option<u64>,
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            total: None,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            total: None,
            message: Some(message.into()),
        }
    }
}

/// Server-side list parameters. Tables load the full set and transform
/// locally, so these are optional narrowing hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ListParams {
    /// Query-string pairs, in a stable order
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search".to_string(), search.to_string()));
        }
        for (name, value) in &self.filters {
            pairs.push((name.clone(), value.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// One list response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<Record>,
    /// Server-reported total; equals `records.len()` when not reported
    pub total: usize,
}

/// URL layout of a REST backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStyle {
    /// `GET/POST {base}/{entity}`, `GET/PUT/DELETE {base}/{entity}/{id}`
    #[default]
    Rest,
    /// `{base}/{entity}.php?action=list|get|create|update|delete&id={id}`
    ActionQuery,
}

/// CRUD access to the records of any entity
pub trait RecordApi: Send + Sync {
    fn list(
        &self,
        entity: &str,
        params: &ListParams,
    ) -> impl Future<Output = Result<RecordPage, TableError>> + Send;

    fn get(&self, entity: &str, id: &RecordId) -> impl Future<Output = Result<Record, TableError>> + Send;

    /// Returns the stored record when the backend echoes it back
    fn create(
        &self,
        entity: &str,
        fields: &Record,
    ) -> impl Future<Output = Result<Option<Record>, TableError>> + Send;

    fn update(
        &self,
        entity: &str,
        id: &RecordId,
        fields: &Record,
    ) -> impl Future<Output = Result<Option<Record>, TableError>> + Send;

    fn delete(&self, entity: &str, id: &RecordId) -> impl Future<Output = Result<(), TableError>> + Send;
}

/// Backend selected by configuration
pub enum Backend {
    Http(HttpRecordApi),
    Memory(MemoryRecordApi),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Http(_) => "http",
            Backend::Memory(_) => "memory",
        }
    }

    /// A backend for one client connection. HTTP backends get their own
    /// cookie jar seeded from `cookie`; the demo backend is shared.
    pub fn for_session(&self, cookie: Option<&str>) -> Result<Backend, TableError> {
        match self {
            Backend::Http(api) => api.for_session(cookie).map(Backend::Http),
            Backend::Memory(api) => Ok(Backend::Memory(api.clone())),
        }
    }
}

impl RecordApi for Backend {
    async fn list(&self, entity: &str, params: &ListParams) -> Result<RecordPage, TableError> {
        match self {
            Backend::Http(api) => api.list(entity, params).await,
            Backend::Memory(api) => api.list(entity, params).await,
        }
    }

    async fn get(&self, entity: &str, id: &RecordId) -> Result<Record, TableError> {
        match self {
            Backend::Http(api) => api.get(entity, id).await,
            Backend::Memory(api) => api.get(entity, id).await,
        }
    }

    async fn create(&self, entity: &str, fields: &Record) -> Result<Option<Record>, TableError> {
        match self {
            Backend::Http(api) => api.create(entity, fields).await,
            Backend::Memory(api) => api.create(entity, fields).await,
        }
    }

    async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        fields: &Record,
    ) -> Result<Option<Record>, TableError> {
        match self {
            Backend::Http(api) => api.update(entity, id, fields).await,
            Backend::Memory(api) => api.update(entity, id, fields).await,
        }
    }

    async fn delete(&self, entity: &str, id: &RecordId) -> Result<(), TableError> {
        match self {
            Backend::Http(api) => api.delete(entity, id).await,
            Backend::Memory(api) => api.delete(entity, id).await,
        }
    }
}

impl SessionApi for Backend {
    async fn check_session(&self) -> Result<SessionStatus, TableError> {
        match self {
            Backend::Http(api) => api.check_session().await,
            Backend::Memory(api) => api.check_session().await,
        }
    }

    async fn session_role(&self) -> Result<Option<String>, TableError> {
        match self {
            Backend::Http(api) => api.session_role().await,
            Backend::Memory(api) => api.session_role().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_defaults() {
        let resp: ApiResponse<Vec<Record>> = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.data, Some(vec![]));

        let resp: ApiResponse<Vec<Record>> =
            serde_json::from_str(r#"{"success": false, "message": "Unauthorized"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.data, None);
        assert_eq!(resp.message.as_deref(), Some("Unauthorized"));
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct SessionInfo {
        role: String,
    }

    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> ApiResponse<T> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_envelope_payload_without_default() {
        let resp: ApiResponse<SessionInfo> = parse(r#"{"success": true, "data": {"role": "cashier"}}"#);
        assert_eq!(resp.data, Some(SessionInfo { role: "cashier".into() }));

        let resp: ApiResponse<SessionInfo> = parse(r#"{"success": false}"#);
        assert_eq!(resp.data, None);
        assert_eq!(resp.total, None);
    }

    #[tokio::test]
    async fn test_demo_backend_per_session() {
        let backend = Backend::Memory(MemoryRecordApi::demo());
        let session = backend.for_session(Some("PHPSESSID=abc")).unwrap();
        assert_eq!(session.name(), "memory");
        assert_eq!(session.session_role().await.unwrap(), None);

        session.delete("customers", &RecordId::from(1)).await.unwrap();
        assert_eq!(backend.list("customers", &ListParams::default()).await.unwrap().total, 4);
    }

    #[test]
    fn test_list_params_query() {
        let params = ListParams {
            search: Some("  para ".into()),
            filters: [("status".to_string(), "Active".to_string())].into_iter().collect(),
            page: Some(2),
            limit: Some(10),
        };
        assert_eq!(
            params.to_query(),
            vec![
                ("search".to_string(), "para".to_string()),
                ("status".to_string(), "Active".to_string()),
                ("page".to_string(), "2".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
        assert!(ListParams::default().to_query().is_empty());
    }

    #[tokio::test]
    async fn test_backend_dispatch() {
        let backend = Backend::Memory(MemoryRecordApi::new().with_seed(
            "customers",
            vec![Record::new().with("id", 1i64).with("name", "Jane Doe")],
        ));
        assert_eq!(backend.name(), "memory");

        let page = backend.list("customers", &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(backend.check_session().await.unwrap(), SessionStatus::Valid);
    }
}
