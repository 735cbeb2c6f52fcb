use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use vocalyx_sync::{
    AdminCoordinator, ClientConfig, ClientError, DashboardApi, DashboardClient, FilterPatch,
    FilterState, JobStatus, NotificationLevel, RecordingView, UploadRequest,
};

const ADMIN_KEY: &str = "admin-secret";

#[derive(Clone, Default)]
struct StubState {
    request_ids: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

struct BackendStub {
    base_url: String,
    state: StubState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl BackendStub {
    fn client(&self) -> Result<DashboardClient> {
        Ok(DashboardClient::new(&ClientConfig::new(&self.base_url))?)
    }

    async fn calls(&self) -> Vec<String> {
        self.state.calls.lock().await.clone()
    }

    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn spawn_backend_stub() -> Result<BackendStub> {
    let state = StubState::default();
    let app = Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/:name", get(project_details))
        .route("/api/transcriptions/recent", get(recent_transcriptions))
        .route("/api/transcriptions/count", get(count_transcriptions))
        .route(
            "/api/transcriptions/:id",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route(
            "/api/workers/status",
            get(|| async { (StatusCode::BAD_GATEWAY, "  worker registry unreachable \n") }),
        )
        .route("/api/upload", post(upload))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/assign-project", post(assign_project))
        .route("/api/admin/users/:id", delete(delete_user))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });

    Ok(BackendStub {
        base_url: format!("http://{addr}"),
        state,
        shutdown: Some(shutdown_tx),
    })
}

async fn record_call(state: &StubState, name: &str) {
    state.calls.lock().await.push(name.to_string());
}

fn admin_key_ok(query: &HashMap<String, String>) -> bool {
    query.get("admin_key").map(String::as_str) == Some(ADMIN_KEY)
}

async fn list_projects(
    State(state): State<StubState>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    record_call(&state, "list_projects").await;
    if !admin_key_ok(&query) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "invalid admin key"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!([
            {
                "id": "8f14e45f-ceea-467f-a0e6-3f3a5d8e5b1c",
                "name": "alpha",
                "created_at": "2025-01-02T03:04:05.123456",
                "api_key": "NON_VISIBLE"
            },
            {"id": 7, "name": "beta"}
        ])),
    )
}

async fn create_project(
    State(state): State<StubState>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    record_call(&state, "create_project").await;
    let name = form.get("project_name").cloned().unwrap_or_default();
    if name == "alpha" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "project 'alpha' already exists"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "p-new",
            "name": name,
            "created_at": "2025-03-01T10:00:00Z",
            "api_key": format!("vk_{}", form.get("admin_key").cloned().unwrap_or_default())
        })),
    )
}

async fn project_details(
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !admin_key_ok(&query) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "invalid admin key"})),
        );
    }
    if name != "alpha beta" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Project not found"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"id": "p1", "name": name, "api_key": "vk_revealed"})),
    )
}

async fn recent_transcriptions(
    State(state): State<StubState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    if let Some(request_id) = headers.get("x-request-id").and_then(|value| value.to_str().ok()) {
        state.request_ids.lock().await.push(request_id.to_string());
    }
    Json(json!([{"id": "t1", "query": query}]))
}

async fn count_transcriptions(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    if query.contains_key("page") || query.contains_key("limit") {
        return Json(json!({"count": -1}));
    }
    Json(json!({"count": 42}))
}

async fn upload(mut multipart: Multipart) -> Json<Value> {
    let mut fields = serde_json::Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let Ok(bytes) = field.bytes().await else {
            break;
        };
        let value = match file_name {
            Some(file_name) => json!({"file_name": file_name, "size": bytes.len()}),
            None => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        };
        fields.insert(name, value);
    }
    Json(json!({"status": "pending", "received": fields}))
}

async fn list_users(State(state): State<StubState>) -> Json<Value> {
    record_call(&state, "list_users").await;
    Json(json!([
        {
            "id": "u1",
            "username": "root",
            "is_admin": true,
            "projects": []
        },
        {
            "id": 2,
            "username": "ada",
            "projects": [{"id": "p1", "name": "alpha"}]
        }
    ]))
}

async fn assign_project(
    State(state): State<StubState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_call(&state, "assign_project").await;
    if body["project_id"] == "missing" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": {"project_id": "unknown"}})),
        );
    }
    (StatusCode::OK, Json(json!({"assigned": body})))
}

async fn delete_user(State(state): State<StubState>, Path(id): Path<String>) -> impl IntoResponse {
    record_call(&state, "delete_user").await;
    if id == "u1" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "cannot delete last admin"})),
        );
    }
    (StatusCode::OK, Json(json!({"deleted": id})))
}

#[tokio::test]
async fn projects_decode_with_naive_timestamps_and_numeric_ids() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let client = stub.client()?;

    let projects = client.list_projects(ADMIN_KEY).await?;

    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0].name, "alpha");
    assert!(projects[0].created_at.is_some());
    assert_eq!(projects[0].secret(), None);
    assert_eq!(projects[1].id.as_deref(), Some("7"));

    let denied = client.list_projects("wrong").await;
    assert!(matches!(
        denied,
        Err(ClientError::Application { status, ref message })
            if status == reqwest::StatusCode::FORBIDDEN && message == "invalid admin key"
    ));

    stub.stop().await;
    Ok(())
}

#[tokio::test]
async fn project_names_are_path_encoded() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let client = stub.client()?;

    let project = client.get_project_details("alpha beta", ADMIN_KEY).await?;
    assert_eq!(project.secret(), Some("vk_revealed"));

    let missing = client.get_project_details("ghost", ADMIN_KEY).await;
    assert!(matches!(missing, Err(ClientError::Application { ref message, .. }) if message == "Project not found"));

    stub.stop().await;
    Ok(())
}

#[tokio::test]
async fn transcription_queries_carry_filters_and_request_ids() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let client = stub.client()?;
    let filter = FilterState::default().merged(
        &FilterPatch::new()
            .status(Some(JobStatus::Failed))
            .search("a&b c"),
    )?;

    let items = client.get_transcriptions(&filter).await?;
    let total = client.count_transcriptions(&filter).await?;

    assert_eq!(
        items[0]["query"],
        json!({"page": "1", "limit": "25", "status": "failed", "search": "a&b c"})
    );
    assert_eq!(total, 42);
    let request_ids = stub.state.request_ids.lock().await.clone();
    assert_eq!(request_ids.len(), 1);
    assert!(request_ids[0].starts_with("req_"));

    stub.stop().await;
    Ok(())
}

#[tokio::test]
async fn error_bodies_fall_back_to_text_then_status_reason() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let client = stub.client()?;

    let workers = client.get_workers_status().await;
    assert!(matches!(
        workers,
        Err(ClientError::Application { ref message, .. }) if message == "worker registry unreachable"
    ));

    let transcription = client.get_transcription("t1").await;
    assert!(matches!(
        transcription,
        Err(ClientError::Application { ref message, .. }) if message == "Internal Server Error"
    ));

    let structured = client.assign_project_to_user("u2", "missing").await;
    assert!(matches!(
        structured,
        Err(ClientError::Application { ref message, .. }) if message == r#"{"project_id":"unknown"}"#
    ));

    stub.stop().await;
    Ok(())
}

#[tokio::test]
async fn upload_sends_multipart_fields() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let client = stub.client()?;

    let response = client
        .upload_audio(UploadRequest {
            file_name: "memo.wav".into(),
            bytes: vec![0; 128],
            project_name: "alpha".into(),
            api_key: "vk_alpha".into(),
            use_vad: true,
        })
        .await?;

    assert_eq!(
        response["received"],
        json!({
            "file": {"file_name": "memo.wav", "size": 128},
            "project_name": "alpha",
            "api_key": "vk_alpha",
            "use_vad": "true"
        })
    );

    stub.stop().await;
    Ok(())
}

#[tokio::test]
async fn deleting_last_admin_surfaces_detail_and_skips_reload() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let view = RecordingView::new();
    let admin = AdminCoordinator::new(
        Arc::new(stub.client()?),
        Some(ADMIN_KEY.into()),
        Arc::new(view.clone()),
        Arc::new(view.clone()),
    );

    let result = admin.delete_user("u1").await;

    assert!(matches!(result, Err(ClientError::Application { ref message, .. }) if message == "cannot delete last admin"));
    assert_eq!(stub.calls().await, vec!["delete_user".to_string()]);
    assert_eq!(
        view.snapshot().notifications,
        vec![(NotificationLevel::Error, "cannot delete last admin".to_string())]
    );

    stub.stop().await;
    Ok(())
}

#[tokio::test]
async fn create_project_against_backend_reloads_both_views() -> Result<()> {
    let stub = spawn_backend_stub().await?;
    let view = RecordingView::new();
    let admin = AdminCoordinator::new(
        Arc::new(stub.client()?),
        Some(ADMIN_KEY.into()),
        Arc::new(view.clone()),
        Arc::new(view.clone()),
    );

    let mut duplicate = vocalyx_sync::ProjectForm::new("alpha");
    assert!(admin.create_project(&mut duplicate).await.is_err());
    assert_eq!(duplicate.name, "alpha");

    let mut form = vocalyx_sync::ProjectForm::new("gamma");
    let project = admin.create_project(&mut form).await?;

    assert_eq!(project.name, "gamma");
    assert!(form.name.is_empty());
    assert_eq!(
        stub.calls().await,
        vec![
            "create_project".to_string(),
            "create_project".to_string(),
            "list_projects".to_string(),
            "list_users".to_string(),
        ]
    );
    let users = admin.users();
    assert_eq!(users[1].id, "2");
    assert!(users[1].has_project("p1"));

    stub.stop().await;
    Ok(())
}
