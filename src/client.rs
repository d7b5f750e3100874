//! HTTP access to the school backend. Every failure comes back as a
//! [`FetchError`] naming the collection; nothing is retried.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::{multipart, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Config;
use crate::models::{Entity, Resource};
use crate::normalize::{normalize_collection, Normalize};

/// File types the backend accepts for work returns.
pub const SUBMISSION_CONTENT_TYPES: [(&str, &str); 3] = [
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

#[derive(Debug, Error)]
#[error("failed to fetch {resource}: {cause}")]
pub struct FetchError {
    pub resource: Resource,
    #[source]
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(resource: Resource, cause: impl Into<FetchCause>) -> Self {
        Self {
            resource,
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.cause {
            FetchCause::Status { status, .. } => Some(*status),
            FetchCause::Transport(err) => err.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("response is not valid JSON: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Reduces an error response to one line: the JSON `message` or `error`
/// field, else the raw text, else the status reason.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = map.get(key).and_then(Value::as_str).map(str::trim) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .map_or_else(|| status.as_str().to_string(), str::to_string)
}

/// Content type for an accepted submission file name, by extension.
pub fn submission_content_type(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    SUBMISSION_CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

#[derive(Debug, Clone)]
pub struct SchoolClient {
    http: reqwest::Client,
    base_url: String,
}

impl SchoolClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_url, config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, resource: Resource, tail: &[&str]) -> String {
        let mut url = format!("{}/{}", self.base_url, resource.path());
        for segment in tail {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    fn request(&self, method: Method, resource: Resource, tail: &[&str]) -> RequestBuilder {
        let url = self.url(resource, tail);
        tracing::debug!(%method, %url, "Backend request");
        self.http
            .request(method, url)
            .header(ACCEPT, "application/json")
    }

    async fn send(&self, resource: Resource, request: RequestBuilder) -> Result<Response, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|err| FetchError::new(resource, err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FetchError::new(
            resource,
            FetchCause::Status {
                status,
                message: error_message(status, &body),
            },
        ))
    }

    async fn send_json(&self, resource: Resource, request: RequestBuilder) -> Result<Value, FetchError> {
        let response = self.send(resource, request).await?;
        let body = response
            .text()
            .await
            .map_err(|err| FetchError::new(resource, err))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|err| FetchError::new(resource, FetchCause::Decode(err.to_string())))
    }

    /// `GET /{resource}` with optional query filters such as `studentId`.
    pub async fn list(&self, resource: Resource, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let request = self.request(Method::GET, resource, &[]).query(query);
        self.send_json(resource, request).await
    }

    pub async fn get(&self, resource: Resource, id: i64) -> Result<Value, FetchError> {
        let id = id.to_string();
        let request = self.request(Method::GET, resource, &[&id]);
        self.send_json(resource, request).await
    }

    pub async fn list_normalized<T: Normalize + Entity>(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, FetchError> {
        let raw = self.list(T::KIND, query).await?;
        Ok(normalize_collection(&raw))
    }

    pub async fn get_normalized<T: Normalize + Entity>(&self, id: i64) -> Result<T, FetchError> {
        let raw = self.get(T::KIND, id).await?;
        Ok(T::from_raw(&raw))
    }

    pub async fn create<B: Serialize + ?Sized>(&self, resource: Resource, body: &B) -> Result<Value, FetchError> {
        let request = self.request(Method::POST, resource, &[]).json(body);
        self.send_json(resource, request).await
    }

    pub async fn update<B: Serialize + ?Sized>(
        &self,
        resource: Resource,
        id: i64,
        body: &B,
    ) -> Result<Value, FetchError> {
        let id = id.to_string();
        let request = self.request(Method::PUT, resource, &[&id]).json(body);
        self.send_json(resource, request).await
    }

    pub async fn delete(&self, resource: Resource, id: i64) -> Result<(), FetchError> {
        let id = id.to_string();
        let request = self.request(Method::DELETE, resource, &[&id]);
        self.send(resource, request).await?;
        Ok(())
    }

    /// Uploads a work return as multipart form data. Empty files and types
    /// other than PDF, DOC and DOCX are refused before any request is made.
    pub async fn submit_work_return(
        &self,
        assignment_id: i64,
        student_id: i64,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Value, FetchError> {
        let resource = Resource::WorkReturns;
        let invalid = |message: &str| FetchError::new(resource, FetchCause::InvalidRequest(message.to_string()));
        if contents.is_empty() {
            return Err(invalid("file is empty"));
        }
        let content_type =
            submission_content_type(file_name).ok_or_else(|| invalid("only PDF, DOC and DOCX files are allowed"))?;

        let part = multipart::Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|err| FetchError::new(resource, err))?;
        let form = multipart::Form::new()
            .text("assignmentId", assignment_id.to_string())
            .text("studentId", student_id.to_string())
            .part("file", part);

        tracing::info!(assignment_id, student_id, file_name, "Submitting work return");
        let request = self.request(Method::POST, resource, &[]).multipart(form);
        self.send_json(resource, request).await
    }

    /// Sets the score of a work return; the backend mirrors it into the
    /// student's grade for that assignment.
    pub async fn grade_work_return(&self, id: i64, grade: u8) -> Result<Value, FetchError> {
        if grade > 100 {
            return Err(FetchError::new(
                Resource::WorkReturns,
                FetchCause::InvalidRequest("grade must be between 0 and 100".to_string()),
            ));
        }
        self.update(Resource::WorkReturns, id, &json!({ "grade": grade })).await
    }

    pub async fn download_work_return(&self, id: i64) -> Result<Vec<u8>, FetchError> {
        let resource = Resource::WorkReturns;
        let id = id.to_string();
        let request = self
            .request(Method::GET, resource, &[&id, "download"])
            .header(ACCEPT, "*/*");
        let response = self.send(resource, request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::new(resource, err))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client() -> SchoolClient {
        SchoolClient::new("http://localhost:8080/api/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let client = client();
        assert_eq!(client.base_url(), "http://localhost:8080/api");
        assert_eq!(client.url(Resource::Students, &[]), "http://localhost:8080/api/students");
        assert_eq!(
            client.url(Resource::WorkReturns, &["3", "download"]),
            "http://localhost:8080/api/workreturns/3/download"
        );
    }

    #[test]
    fn error_message_prefers_json_fields() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(error_message(status, r#"{"message":"Student not found"}"#), "Student not found");
        assert_eq!(error_message(status, r#"{"error":"Bad Request","status":400}"#), "Bad Request");
        assert_eq!(error_message(status, r#"{"message":"","error":"Nope"}"#), "Nope");
        assert_eq!(error_message(status, "plain failure\n"), "plain failure");
        assert_eq!(error_message(status, "  "), "Bad Request");
        assert_eq!(error_message(status, r#"{"detail":"x"}"#), r#"{"detail":"x"}"#);
    }

    #[test]
    fn submission_types_follow_backend_rule() {
        assert_eq!(submission_content_type("essay.PDF"), Some("application/pdf"));
        assert_eq!(submission_content_type("notes.doc"), Some("application/msword"));
        assert!(submission_content_type("report.docx").is_some());
        assert_eq!(submission_content_type("photo.png"), None);
        assert_eq!(submission_content_type("pdf"), None);
    }

    #[tokio::test]
    async fn empty_submission_is_refused_locally() {
        let err = client()
            .submit_work_return(1, 1, "essay.pdf", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.resource, Resource::WorkReturns);
        assert!(matches!(err.cause, FetchCause::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn wrong_file_type_is_refused_locally() {
        let err = client()
            .submit_work_return(1, 1, "essay.exe", vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("only PDF, DOC and DOCX"));
    }

    #[tokio::test]
    async fn out_of_range_grade_is_refused_locally() {
        let err = client().grade_work_return(1, 101).await.unwrap_err();
        assert!(matches!(err.cause, FetchCause::InvalidRequest(_)));
    }
}
