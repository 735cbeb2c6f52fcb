//! In-memory collaborators for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::connection::{ConnectionState, LiveChannel};
use crate::error::{ClientError, Result};
use crate::filter::FilterState;
use crate::lock_unpoisoned;
use crate::model::{MASKED_SECRET, Project, User};
use crate::transport::{DashboardApi, UploadRequest};

/// Calls that mutate or reload admin views, in the order they were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListProjects,
    CreateProject(String),
    ListUsers,
    CreateUser(String),
    DeleteUser(String),
    Assign(String, String),
    Remove(String, String),
    Upload {
        file_name: String,
        size: usize,
        project_name: String,
        use_vad: bool,
    },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<ApiCall>,
    fail_next: Option<(StatusCode, String)>,
    projects: Vec<(Project, String)>,
    users: Vec<User>,
    detail_requests: Vec<(String, String)>,
    details_delay: Option<Duration>,
    items: Value,
    total: u64,
    delayed_items: Option<(Duration, Value)>,
    transcription_error: Option<String>,
    delayed_failure: Option<(Duration, String)>,
    transcription_queries: Vec<FilterState>,
    count_queries: Vec<FilterState>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn add_project(&self, name: &str, api_key: &str) -> String {
        let mut state = lock_unpoisoned(&self.state);
        let id = format!("p{}", state.projects.len() + 1);
        state.projects.push((
            Project {
                id: Some(id.clone()),
                name: name.to_string(),
                created_at: None,
                api_key: Some(MASKED_SECRET.to_string()),
            },
            api_key.to_string(),
        ));
        id
    }

    pub fn add_user(&self, user: User) {
        lock_unpoisoned(&self.state).users.push(user);
    }

    pub fn set_transcriptions(&self, items: Value, total: u64) {
        let mut state = lock_unpoisoned(&self.state);
        state.items = items;
        state.total = total;
    }

    pub fn delay_next_transcriptions(&self, delay: Duration, items: Value) {
        lock_unpoisoned(&self.state).delayed_items = Some((delay, items));
    }

    pub fn fail_transcriptions(&self, message: &str) {
        lock_unpoisoned(&self.state).transcription_error = Some(message.to_string());
    }

    /// The next transcription list fails with `message` after `delay`.
    pub fn fail_next_transcriptions_after(&self, delay: Duration, message: &str) {
        lock_unpoisoned(&self.state).delayed_failure = Some((delay, message.to_string()));
    }

    pub fn delay_details(&self, delay: Duration) {
        lock_unpoisoned(&self.state).details_delay = Some(delay);
    }

    /// The next recorded call fails with `status` and `message`.
    pub fn fail_next(&self, status: StatusCode, message: &str) {
        lock_unpoisoned(&self.state).fail_next = Some((status, message.to_string()));
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock_unpoisoned(&self.state).calls.clone()
    }

    pub fn detail_requests(&self) -> Vec<(String, String)> {
        lock_unpoisoned(&self.state).detail_requests.clone()
    }

    pub fn transcription_queries(&self) -> Vec<FilterState> {
        lock_unpoisoned(&self.state).transcription_queries.clone()
    }

    pub fn count_queries(&self) -> Vec<FilterState> {
        lock_unpoisoned(&self.state).count_queries.clone()
    }

    fn record(&self, call: ApiCall) -> Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(call);
        match state.fail_next.take() {
            Some((status, message)) => Err(ClientError::Application { status, message }),
            None => Ok(()),
        }
    }
}

fn not_found(message: &str) -> ClientError {
    ClientError::Application {
        status: StatusCode::NOT_FOUND,
        message: message.to_string(),
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn list_projects(&self, _admin_key: &str) -> Result<Vec<Project>> {
        self.record(ApiCall::ListProjects)?;
        let state = lock_unpoisoned(&self.state);
        Ok(state.projects.iter().map(|(project, _)| project.clone()).collect())
    }

    async fn create_project(&self, project_name: &str, _admin_key: &str) -> Result<Project> {
        self.record(ApiCall::CreateProject(project_name.to_string()))?;
        let key = format!("vk_{project_name}");
        let id = self.add_project(project_name, &key);
        Ok(Project {
            id: Some(id),
            name: project_name.to_string(),
            created_at: None,
            api_key: Some(key),
        })
    }

    async fn get_project_details(&self, project_name: &str, admin_key: &str) -> Result<Project> {
        let delay = {
            let mut state = lock_unpoisoned(&self.state);
            state
                .detail_requests
                .push((project_name.to_string(), admin_key.to_string()));
            state.details_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = lock_unpoisoned(&self.state);
        state
            .projects
            .iter()
            .find(|(project, _)| project.name == project_name)
            .map(|(project, key)| Project {
                api_key: Some(key.clone()),
                ..project.clone()
            })
            .ok_or_else(|| not_found("project not found"))
    }

    async fn upload_audio(&self, request: UploadRequest) -> Result<Value> {
        self.record(ApiCall::Upload {
            file_name: request.file_name,
            size: request.bytes.len(),
            project_name: request.project_name,
            use_vad: request.use_vad,
        })?;
        Ok(json!({"transcription_id": "job-1", "status": "pending"}))
    }

    async fn get_transcriptions(&self, filter: &FilterState) -> Result<Value> {
        let (delayed, items, failure, delayed_failure) = {
            let mut state = lock_unpoisoned(&self.state);
            state.transcription_queries.push(filter.clone());
            (
                state.delayed_items.take(),
                state.items.clone(),
                state.transcription_error.clone(),
                state.delayed_failure.take(),
            )
        };
        if let Some((delay, message)) = delayed_failure {
            tokio::time::sleep(delay).await;
            return Err(ClientError::Application {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
            });
        }
        if let Some(message) = failure {
            return Err(ClientError::Application {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
            });
        }
        match delayed {
            Some((delay, items)) => {
                tokio::time::sleep(delay).await;
                Ok(items)
            }
            None => Ok(items),
        }
    }

    async fn count_transcriptions(&self, filter: &FilterState) -> Result<u64> {
        let mut state = lock_unpoisoned(&self.state);
        state.count_queries.push(filter.clone());
        Ok(state.total)
    }

    async fn get_transcription(&self, transcription_id: &str) -> Result<Value> {
        Ok(json!({"id": transcription_id}))
    }

    async fn delete_transcription(&self, transcription_id: &str) -> Result<Value> {
        Ok(json!({"deleted": transcription_id}))
    }

    async fn get_workers_status(&self) -> Result<Value> {
        Ok(json!({"workers": []}))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.record(ApiCall::ListUsers)?;
        Ok(lock_unpoisoned(&self.state).users.clone())
    }

    async fn create_user(&self, username: &str, _password: &str, is_admin: bool) -> Result<User> {
        self.record(ApiCall::CreateUser(username.to_string()))?;
        let mut state = lock_unpoisoned(&self.state);
        let user = User {
            id: format!("u{}", state.users.len() + 1),
            username: username.to_string(),
            is_admin,
            projects: Vec::new(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn assign_project_to_user(&self, user_id: &str, project_id: &str) -> Result<Value> {
        self.record(ApiCall::Assign(user_id.to_string(), project_id.to_string()))?;
        Ok(json!({"status": "assigned"}))
    }

    async fn remove_project_from_user(&self, user_id: &str, project_id: &str) -> Result<Value> {
        self.record(ApiCall::Remove(user_id.to_string(), project_id.to_string()))?;
        Ok(json!({"status": "removed"}))
    }

    async fn delete_user(&self, user_id: &str) -> Result<Value> {
        self.record(ApiCall::DeleteUser(user_id.to_string()))?;
        Ok(json!({"status": "deleted"}))
    }
}

/// Live channel that records sent messages instead of writing to a socket.
pub struct FakeLive {
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<Value>>,
    failing: AtomicBool,
}

impl FakeLive {
    fn with_state(state: ConnectionState) -> Self {
        Self {
            state: Mutex::new(state),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn connected() -> Self {
        Self::with_state(ConnectionState::Connected)
    }

    pub fn disconnected() -> Self {
        Self::with_state(ConnectionState::Disconnected)
    }

    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Value> {
        lock_unpoisoned(&self.sent).clone()
    }
}

#[async_trait]
impl LiveChannel for FakeLive {
    fn state(&self) -> ConnectionState {
        *lock_unpoisoned(&self.state)
    }

    async fn send_json(&self, message: &Value) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionLost("socket closed".into()));
        }
        lock_unpoisoned(&self.sent).push(message.clone());
        Ok(())
    }
}
