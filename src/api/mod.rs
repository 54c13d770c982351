use crate::models::{Category, Note, NoteUpdate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    /// Transport failure (offline, DNS, CORS, aborted request).
    Network,
    /// The referenced record no longer exists server-side.
    NotFound,
    Http,
    Parse,
}

#[derive(Clone, Debug)]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: e.to_string(),
        }
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: e.to_string(),
        }
    }

    fn not_found(ctx: &str) -> Self {
        Self {
            kind: ApiErrorKind::NotFound,
            message: format!("{ctx}: not found"),
        }
    }

    fn http(status: reqwest::StatusCode, body: String, ctx: &str) -> Self {
        Self {
            kind: ApiErrorKind::Http,
            message: format!("{ctx} ({status}): {body}"),
        }
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct EnvConfig {
    pub api_url: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        let default_api_url = "http://localhost:8000".to_string();

        // We support BOTH `window.ENV.API_URL` (documented in README) and
        // `window.ENV.api_url` (legacy/implementation detail) for
        // compatibility.
        if let Some(window) = web_sys::window() {
            if let Some(env) = window.get("ENV") {
                if !env.is_undefined() && env.is_object() {
                    // 1) Prefer README style: API_URL
                    if let Ok(api_url) = js_sys::Reflect::get(&env, &"API_URL".into()) {
                        if let Some(url_str) = api_url.as_string() {
                            return Self { api_url: url_str };
                        }
                    }

                    // 2) Fallback: api_url
                    if let Ok(api_url) = js_sys::Reflect::get(&env, &"api_url".into()) {
                        if let Some(url_str) = api_url.as_string() {
                            return Self { api_url: url_str };
                        }
                    }
                }
            }
        }

        Self {
            api_url: default_api_url,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn get_api_url() -> String {
    EnvConfig::new().api_url
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct CreateNoteRequest {
    pub title: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct CreateCategoryRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Client for the hosted note registry. All calls are asynchronous; the
/// registry is the system of record for ids and timestamps.
#[derive(Clone)]
pub(crate) struct ApiClient {
    pub(crate) base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self { base_url }
    }

    pub fn from_env() -> Self {
        Self::new(get_api_url())
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&impl serde::Serialize>,
        ctx: &str,
    ) -> ApiResult<T> {
        let client = reqwest::Client::new();
        let url = format!("{}{}", self.base_url, path);
        let mut req = client.request(method, url);

        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req.send().await.map_err(ApiError::network)?;

        if res.status().is_success() {
            res.json().await.map_err(ApiError::parse)
        } else if res.status().as_u16() == 404 {
            Err(ApiError::not_found(ctx))
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::http(status, body, ctx))
        }
    }

    async fn request_no_body(
        &self,
        method: reqwest::Method,
        path: &str,
        ctx: &str,
    ) -> ApiResult<()> {
        let client = reqwest::Client::new();
        let url = format!("{}{}", self.base_url, path);
        let res = client
            .request(method, url)
            .send()
            .await
            .map_err(ApiError::network)?;

        if res.status().is_success() {
            Ok(())
        } else if res.status().as_u16() == 404 {
            Err(ApiError::not_found(ctx))
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::http(status, body, ctx))
        }
    }

    /// All notes, newest-updated first (the server's ordering is kept).
    pub async fn list_notes(&self) -> ApiResult<Vec<Note>> {
        self.request(
            reqwest::Method::GET,
            "/notes",
            None::<&()>,
            "Loading notes",
        )
        .await
    }

    /// First save of a new note. The server assigns id, created_at and
    /// updated_at.
    pub async fn create_note(&self, title: &str, content: &str) -> ApiResult<Note> {
        self.request(
            reqwest::Method::POST,
            "/notes",
            Some(&CreateNoteRequest {
                title: title.to_string(),
                content: content.to_string(),
            }),
            "Creating note",
        )
        .await
    }

    /// Partial update; the server refreshes updated_at and returns the
    /// full record.
    pub async fn update_note(&self, id: &str, update: NoteUpdate) -> ApiResult<Note> {
        self.request(
            reqwest::Method::PATCH,
            &format!("/notes/{}", urlencoding::encode(id)),
            Some(&update),
            "Saving note",
        )
        .await
    }

    /// Idempotent to callers: deleting an already-deleted note is success.
    pub async fn delete_note(&self, id: &str) -> ApiResult<()> {
        match self
            .request_no_body(
                reqwest::Method::DELETE,
                &format!("/notes/{}", urlencoding::encode(id)),
                "Deleting note",
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.kind == ApiErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.request(
            reqwest::Method::GET,
            "/categories",
            None::<&()>,
            "Loading categories",
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn create_category(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ApiResult<Category> {
        self.request(
            reqwest::Method::POST,
            "/categories",
            Some(&CreateCategoryRequest {
                name: name.to_string(),
                parent_id: parent_id.map(|p| p.to_string()),
            }),
            "Creating category",
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn delete_category(&self, id: &str) -> ApiResult<()> {
        match self
            .request_no_body(
                reqwest::Method::DELETE,
                &format!("/categories/{}", urlencoding::encode(id)),
                "Deleting category",
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.kind == ApiErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_contract_deserialize() {
        let json = r#"{
            "id": "b7f9",
            "title": "Groceries",
            "content": "<p>milk</p>",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-02T08:30:00Z",
            "tags": ["home", "errands"],
            "category_id": null,
            "is_starred": true,
            "order": 3
        }"#;
        let note: Note = serde_json::from_str(json).expect("note should parse");
        assert_eq!(note.id, "b7f9");
        assert_eq!(note.tags, vec!["home", "errands"]);
        assert!(note.is_starred);
        assert_eq!(note.order, 3);
    }

    #[test]
    fn test_note_contract_tolerates_missing_optional_fields() {
        // Older backend rows predate tags/starred/order.
        let json = r#"{
            "id": "a1",
            "title": "Old",
            "content": "",
            "created_at": "2023-01-01T00:00:00Z",
            "updated_at": "2023-01-01T00:00:00Z"
        }"#;
        let note: Note = serde_json::from_str(json).expect("legacy note should parse");
        assert!(note.tags.is_empty());
        assert!(note.category_id.is_none());
        assert!(!note.is_starred);
    }

    #[test]
    fn test_note_update_serializes_only_present_fields() {
        let update = NoteUpdate {
            title: Some("T".to_string()),
            content: Some("<p></p>".to_string()),
            ..Default::default()
        };
        let v = serde_json::to_value(update).expect("should serialize");
        assert_eq!(v["title"], "T");
        assert!(v.get("tags").is_none());
        assert!(v.get("is_starred").is_none());
    }

    #[test]
    fn test_note_update_can_clear_category() {
        let update = NoteUpdate {
            category_id: Some(None),
            ..Default::default()
        };
        let v = serde_json::to_value(update).expect("should serialize");
        assert!(v.get("category_id").is_some());
        assert!(v["category_id"].is_null());
    }

    #[test]
    fn test_category_contract_deserialize() {
        let json = r#"[{"id": "c1", "name": "Work", "parent_id": null, "order": 0},
                       {"id": "c2", "name": "Projects", "parent_id": "c1", "order": 1}]"#;
        let cats: Vec<Category> = serde_json::from_str(json).expect("categories should parse");
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[1].parent_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_api_client_new() {
        let client = ApiClient::new("http://localhost:8000".to_string());
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
