//! Mock moderator backend for end-to-end tests
//!
//! Spawns an in-process axum server on a random port that implements the
//! endpoints the client talks to. Tests script its behavior through the
//! shared [`MockState`]: the login response shape, transient failures and
//! per-item image failures, and read back call counters afterwards.

use super::constants::*;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Shape of the login success payload the mock answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginShape {
    /// `{"token": ..., "user": {...}}`
    TopLevelToken,
    /// `{"access_token": ..., "user_data": {...}}`
    AltFields,
    /// `{"user": {...}}` with no token anywhere
    UserOnly,
    /// Token plus the user's fields spread over the top level
    FlatUser,
}

pub struct MockState {
    pub login_shape: Mutex<LoginShape>,
    pub login_attempts: AtomicU32,
    /// Number of upcoming login requests to answer with 503.
    pub login_failures_remaining: AtomicU32,

    pub events: Mutex<Vec<Value>>,
    pub next_event_id: AtomicU64,

    pub images: Mutex<Vec<Value>>,
    pub next_image_id: AtomicU64,
    /// Upload file names to fail with 500.
    pub failing_uploads: Mutex<Vec<String>>,
    /// Image ids whose deletion fails with 500.
    pub failing_deletes: Mutex<Vec<u64>>,
    pub upload_calls: AtomicU32,
    pub delete_calls: AtomicU32,
}

impl MockState {
    fn new() -> Self {
        Self {
            login_shape: Mutex::new(LoginShape::TopLevelToken),
            login_attempts: AtomicU32::new(0),
            login_failures_remaining: AtomicU32::new(0),
            events: Mutex::new(Vec::new()),
            next_event_id: AtomicU64::new(1),
            images: Mutex::new(Vec::new()),
            next_image_id: AtomicU64::new(1),
            failing_uploads: Mutex::new(Vec::new()),
            failing_deletes: Mutex::new(Vec::new()),
            upload_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
        }
    }

    fn user_payload(&self, with_permissions: bool) -> Value {
        let mut user = json!({
            "id": TEST_USER_ID,
            "email": TEST_EMAIL,
            "name": "Test Moderator",
            "companies": [{"id": TEST_COMPANY_ID, "name": TEST_COMPANY_NAME}],
        });
        if with_permissions {
            user["permissions"] = json!(["read", "update", "create", "delete"]);
        }
        user
    }
}

/// Mock server instance with scriptable behavior.
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Shared behavior knobs and counters
    pub state: Arc<MockState>,

    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

// Each integration test binary compiles its own copy of this module, so
// not every helper is used everywhere.
#[allow(dead_code)]
impl TestServer {
    /// Spawns the mock backend on a random port and waits for it to be
    /// ready.
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::new());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = make_app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock server failed");
        });

        let server = Self {
            base_url,
            port,
            state,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    pub fn set_login_shape(&self, shape: LoginShape) {
        *self.state.login_shape.lock().unwrap() = shape;
    }

    /// The next `count` login requests answer 503 before the mock goes back
    /// to normal behavior.
    pub fn fail_next_logins(&self, count: u32) {
        self.state
            .login_failures_remaining
            .store(count, Ordering::SeqCst);
    }

    pub fn login_attempts(&self) -> u32 {
        self.state.login_attempts.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.state.upload_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    pub fn fail_upload_named(&self, file_name: &str) {
        self.state
            .failing_uploads
            .lock()
            .unwrap()
            .push(file_name.to_string());
    }

    pub fn fail_delete_of(&self, image_id: u64) {
        self.state.failing_deletes.lock().unwrap().push(image_id);
    }

    /// Seed a server-side event, returning its id.
    pub fn seed_event(&self, mut event: Value) -> u64 {
        let id = self.state.next_event_id.fetch_add(1, Ordering::SeqCst);
        event["id"] = json!(id);
        self.state.events.lock().unwrap().push(event);
        id
    }

    /// Seed a server-side image, returning its id.
    pub fn seed_image(&self, alt_text: &str, is_primary: bool) -> u64 {
        let id = self.state.next_image_id.fetch_add(1, Ordering::SeqCst);
        self.state.images.lock().unwrap().push(json!({
            "id": id,
            "url": format!("https://cdn.test/{}.jpg", id),
            "alt_text": alt_text,
            "is_primary": is_primary,
        }));
        id
    }

    /// Current server-side image list.
    pub fn images(&self) -> Vec<Value> {
        self.state.images.lock().unwrap().clone()
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Mock server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn make_app(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/v2/auth/login", post(login))
        .route("/v2/auth/profile", get(profile))
        .route("/v2/event/{company_id}/list", get(list_events))
        .route("/v2/event/{company_id}/create", post(create_event))
        .route("/v2/event/update/{event_id}", patch(update_event))
        .route(
            "/v2/event/company/events/{event_id}/delete",
            delete(delete_event),
        )
        .route("/v2/event/details/{event_id}", get(event_details))
        .route("/category/list/", get(list_categories))
        .route("/city/admin/list/", get(list_cities))
        .route("/v2/country/list", get(list_countries))
        .route("/v2/event/{event_id}/images", post(upload_image))
        .route(
            "/v2/event/admin/event/{event_id}/image/{image_id}",
            delete(delete_image).put(update_image),
        )
        .route(
            "/v2/event/company/events/{event_id}/images/update/{image_id}",
            patch(set_primary_image),
        )
        .with_state(state)
}

/// Accepts the issued bearer token or any synthesized session token.
fn authorized(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    token == TEST_TOKEN || token.starts_with("session_")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Authentication credentials were not provided."})),
    )
        .into_response()
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.login_attempts.fetch_add(1, Ordering::SeqCst);

    let failures = state.login_failures_remaining.load(Ordering::SeqCst);
    if failures > 0 {
        state
            .login_failures_remaining
            .store(failures - 1, Ordering::SeqCst);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Service temporarily unavailable"})),
        )
            .into_response();
    }

    let email = body.get("email").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);
    if email != Some(TEST_EMAIL) || password != Some(TEST_PASSWORD) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid credentials"})),
        )
            .into_response();
    }

    let shape = *state.login_shape.lock().unwrap();
    let payload = match shape {
        LoginShape::TopLevelToken => json!({
            "token": TEST_TOKEN,
            "user": state.user_payload(true),
        }),
        LoginShape::AltFields => json!({
            "access_token": TEST_TOKEN,
            "user_data": state.user_payload(true),
        }),
        LoginShape::UserOnly => json!({
            "user": state.user_payload(false),
        }),
        LoginShape::FlatUser => {
            let mut payload = state.user_payload(true);
            payload["token"] = json!(TEST_TOKEN);
            payload
        }
    };

    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            format!("csrftoken={}; Path=/", TEST_CSRF),
        )],
        Json(payload),
    )
        .into_response()
}

async fn profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(state.user_payload(true)).into_response()
}

async fn list_events(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(company_id): Path<u64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if company_id != TEST_COMPANY_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Unknown company"})),
        )
            .into_response();
    }
    let events = state.events.lock().unwrap().clone();
    Json(json!({"results": events})).into_response()
}

async fn create_event(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(company_id): Path<u64>,
    Json(mut event): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if company_id != TEST_COMPANY_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Unknown company"})),
        )
            .into_response();
    }
    let id = state.next_event_id.fetch_add(1, Ordering::SeqCst);
    event["id"] = json!(id);
    state.events.lock().unwrap().push(event.clone());
    (StatusCode::CREATED, Json(event)).into_response()
}

async fn update_event(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(event_id): Path<u64>,
    Json(patch): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut events = state.events.lock().unwrap();
    let Some(event) = events
        .iter_mut()
        .find(|event| event.get("id").and_then(Value::as_u64) == Some(event_id))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Event not found"})),
        )
            .into_response();
    };
    if let (Some(existing), Some(fields)) = (event.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
        }
    }
    Json(event.clone()).into_response()
}

async fn delete_event(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(event_id): Path<u64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut events = state.events.lock().unwrap();
    let before = events.len();
    events.retain(|event| event.get("id").and_then(Value::as_u64) != Some(event_id));
    if events.len() == before {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Event not found"})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn event_details(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(event_id): Path<u64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let images = state.images.lock().unwrap().clone();
    Json(json!({
        "id": event_id,
        "name": "Details Event",
        "images": images,
    }))
    .into_response()
}

// The lookup endpoints deliberately use three different envelopes.

async fn list_categories(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!([{"id": 1, "name": "Music"}, {"id": 2, "name": "Sports"}])).into_response()
}

async fn list_cities(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"results": [{"id": 10, "name": "Berlin"}]})).into_response()
}

async fn list_countries(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": [{"id": 20, "name": "Germany"}, {"id": 21, "name": "France"}]}))
        .into_response()
}

async fn upload_image(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(_event_id): Path<u64>,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    state.upload_calls.fetch_add(1, Ordering::SeqCst);

    let mut file_name = String::new();
    let mut alt_text = String::new();
    let mut bytes = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                file_name = field.file_name().unwrap_or_default().to_string();
                bytes = field.bytes().await.unwrap_or_default().to_vec();
            }
            "alt_text" => {
                alt_text = field.text().await.unwrap_or_default();
            }
            _ => {}
        }
    }

    if bytes.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Missing image payload"})),
        )
            .into_response();
    }
    if state.failing_uploads.lock().unwrap().contains(&file_name) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "Upload failed"})),
        )
            .into_response();
    }

    let id = state.next_image_id.fetch_add(1, Ordering::SeqCst);
    let image = json!({
        "id": id,
        "url": format!("https://cdn.test/{}.jpg", id),
        "alt_text": alt_text,
        "is_primary": false,
    });
    state.images.lock().unwrap().push(image.clone());
    (StatusCode::CREATED, Json(image)).into_response()
}

async fn delete_image(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((_event_id, image_id)): Path<(u64, u64)>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    state.delete_calls.fetch_add(1, Ordering::SeqCst);

    if state.failing_deletes.lock().unwrap().contains(&image_id) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "Delete failed"})),
        )
            .into_response();
    }

    let mut images = state.images.lock().unwrap();
    let before = images.len();
    images.retain(|image| image.get("id").and_then(Value::as_u64) != Some(image_id));
    if images.len() == before {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Image not found"})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn update_image(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((_event_id, image_id)): Path<(u64, u64)>,
    Json(patch): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut images = state.images.lock().unwrap();
    let Some(image) = images
        .iter_mut()
        .find(|image| image.get("id").and_then(Value::as_u64) == Some(image_id))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Image not found"})),
        )
            .into_response();
    };
    if let (Some(existing), Some(fields)) = (image.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
        }
    }
    Json(image.clone()).into_response()
}

async fn set_primary_image(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((_event_id, image_id)): Path<(u64, u64)>,
    Json(_body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut images = state.images.lock().unwrap();
    if !images
        .iter()
        .any(|image| image.get("id").and_then(Value::as_u64) == Some(image_id))
    {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Image not found"})),
        )
            .into_response();
    }
    for image in images.iter_mut() {
        let is_target = image.get("id").and_then(Value::as_u64) == Some(image_id);
        image["is_primary"] = json!(is_target);
    }
    StatusCode::NO_CONTENT.into_response()
}
