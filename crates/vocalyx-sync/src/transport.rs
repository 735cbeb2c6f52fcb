//! REST side of the dashboard: one typed method per backend endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::filter::FilterState;
use crate::model::{Project, User, decode_count};

/// Multipart job submission for `POST /api/upload`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub project_name: String,
    pub api_key: String,
    pub use_vad: bool,
}

#[derive(Debug, Serialize)]
struct ProjectAssignment<'a> {
    user_id: &'a str,
    project_id: &'a str,
}

/// Backend operations the sync core depends on.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn list_projects(&self, admin_key: &str) -> Result<Vec<Project>>;
    async fn create_project(&self, project_name: &str, admin_key: &str) -> Result<Project>;
    async fn get_project_details(&self, project_name: &str, admin_key: &str) -> Result<Project>;
    async fn upload_audio(&self, request: UploadRequest) -> Result<Value>;
    async fn get_transcriptions(&self, filter: &FilterState) -> Result<Value>;
    async fn count_transcriptions(&self, filter: &FilterState) -> Result<u64>;
    async fn get_transcription(&self, transcription_id: &str) -> Result<Value>;
    async fn delete_transcription(&self, transcription_id: &str) -> Result<Value>;
    async fn get_workers_status(&self) -> Result<Value>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn create_user(&self, username: &str, password: &str, is_admin: bool) -> Result<User>;
    async fn assign_project_to_user(&self, user_id: &str, project_id: &str) -> Result<Value>;
    async fn remove_project_from_user(&self, user_id: &str, project_id: &str) -> Result<Value>;
    async fn delete_user(&self, user_id: &str) -> Result<Value>;
}

/// reqwest-backed [`DashboardApi`]. Never retries; a failure is reported once.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    base_url: Url,
    timeout: Duration,
    http: reqwest::Client,
}

impl DashboardClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.dashboard_url)?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| ClientError::Transport(error.to_string()))?;
        Ok(Self {
            base_url,
            timeout: config.request_timeout,
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Absolute URL for `segments` under the base, with encoded query pairs.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(ClientError::InvalidUrl(format!(
                "empty path segment in {segments:?}"
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let request = self.http.get(url.clone());
        self.send(request, &url).await
    }

    async fn delete_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let request = self.http.delete(url.clone());
        self.send(request, &url).await
    }

    async fn post_form<T: DeserializeOwned>(&self, url: Url, fields: &[(&str, &str)]) -> Result<T> {
        let request = self.http.post(url.clone()).form(fields);
        self.send(request, &url).await
    }

    async fn post_json<Req, T>(&self, url: Url, payload: &Req) -> Result<T>
    where
        Req: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.http.post(url.clone()).json(payload);
        self.send(request, &url).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<T> {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        debug!(request_id = %request_id, path = url.path(), "dashboard request");
        let response = request
            .header("x-request-id", request_id.as_str())
            .timeout(self.timeout)
            .send()
            .await?;
        debug!(
            request_id = %request_id,
            status = response.status().as_u16(),
            "dashboard response"
        );
        decode_json_response(response).await
    }
}

#[async_trait]
impl DashboardApi for DashboardClient {
    async fn list_projects(&self, admin_key: &str) -> Result<Vec<Project>> {
        let url = self.endpoint(
            &["api", "projects"],
            &[("admin_key", admin_key.to_string())],
        )?;
        self.get_json(url).await
    }

    async fn create_project(&self, project_name: &str, admin_key: &str) -> Result<Project> {
        let url = self.endpoint(&["api", "projects"], &[])?;
        self.post_form(
            url,
            &[("project_name", project_name), ("admin_key", admin_key)],
        )
        .await
    }

    async fn get_project_details(&self, project_name: &str, admin_key: &str) -> Result<Project> {
        let url = self.endpoint(
            &["api", "projects", project_name],
            &[("admin_key", admin_key.to_string())],
        )?;
        self.get_json(url).await
    }

    async fn upload_audio(&self, request: UploadRequest) -> Result<Value> {
        let url = self.endpoint(&["api", "upload"], &[])?;
        let form = Form::new()
            .part("file", Part::bytes(request.bytes).file_name(request.file_name))
            .text("project_name", request.project_name)
            .text("api_key", request.api_key)
            .text("use_vad", request.use_vad.to_string());
        let builder = self.http.post(url.clone()).multipart(form);
        self.send(builder, &url).await
    }

    async fn get_transcriptions(&self, filter: &FilterState) -> Result<Value> {
        let url = self.endpoint(&["api", "transcriptions", "recent"], &filter.query_pairs())?;
        self.get_json(url).await
    }

    async fn count_transcriptions(&self, filter: &FilterState) -> Result<u64> {
        let url = self.endpoint(
            &["api", "transcriptions", "count"],
            &filter.count_query_pairs(),
        )?;
        let value: Value = self.get_json(url).await?;
        decode_count(&value)
            .ok_or_else(|| ClientError::Decode(format!("unexpected count payload: {value}")))
    }

    async fn get_transcription(&self, transcription_id: &str) -> Result<Value> {
        let url = self.endpoint(&["api", "transcriptions", transcription_id], &[])?;
        self.get_json(url).await
    }

    async fn delete_transcription(&self, transcription_id: &str) -> Result<Value> {
        let url = self.endpoint(&["api", "transcriptions", transcription_id], &[])?;
        self.delete_json(url).await
    }

    async fn get_workers_status(&self) -> Result<Value> {
        let url = self.endpoint(&["api", "workers", "status"], &[])?;
        self.get_json(url).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let url = self.endpoint(&["api", "admin", "users"], &[])?;
        self.get_json(url).await
    }

    async fn create_user(&self, username: &str, password: &str, is_admin: bool) -> Result<User> {
        let url = self.endpoint(&["api", "admin", "users"], &[])?;
        let is_admin = is_admin.to_string();
        self.post_form(
            url,
            &[
                ("username", username),
                ("password", password),
                ("is_admin", is_admin.as_str()),
            ],
        )
        .await
    }

    async fn assign_project_to_user(&self, user_id: &str, project_id: &str) -> Result<Value> {
        let url = self.endpoint(&["api", "admin", "users", "assign-project"], &[])?;
        self.post_json(url, &ProjectAssignment {
            user_id,
            project_id,
        })
        .await
    }

    async fn remove_project_from_user(&self, user_id: &str, project_id: &str) -> Result<Value> {
        let url = self.endpoint(&["api", "admin", "users", "remove-project"], &[])?;
        self.post_json(url, &ProjectAssignment {
            user_id,
            project_id,
        })
        .await
    }

    async fn delete_user(&self, user_id: &str) -> Result<Value> {
        let url = self.endpoint(&["api", "admin", "users", user_id], &[])?;
        self.delete_json(url).await
    }
}

/// Human-readable message from an error body: JSON `detail`, then `message`,
/// then the raw text, then the status reason for an empty body.
#[must_use]
pub fn extract_error_message(status: StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
        for key in ["detail", "message"] {
            match map.get(key) {
                Some(Value::String(message)) if !message.is_empty() => return message.clone(),
                Some(Value::Null | Value::Bool(false)) | None => {}
                Some(Value::String(_)) => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    if text.is_empty() {
        return status
            .canonical_reason()
            .map_or_else(|| status.as_u16().to_string(), str::to_string);
    }
    text
}

fn normalize_base_url(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidUrl("base URL missing".to_string()));
    }
    let url = Url::parse(trimmed)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use http:// or https:// scheme, got: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

async fn decode_json_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(ClientError::Application {
            status,
            message: extract_error_message(status, &bytes),
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(Value::Null)
            .map_err(|error| ClientError::Decode(error.to_string()));
    }
    serde_json::from_slice::<T>(&bytes).map_err(|error| ClientError::Decode(error.to_string()))
}
