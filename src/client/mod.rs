//! Configured HTTP client for the moderator API.
//!
//! Every request carries the stored bearer token and CSRF cookie; every
//! 401/403 response tears down the stored session and broadcasts a
//! [`SessionEvent`] before the caller observes the error, so no caller can
//! keep acting on a rejected session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::SET_COOKIE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::session::SessionStore;

/// Session lifecycle notifications emitted by the client.
///
/// The application layer subscribes and translates these into navigation
/// (the CLI prints and exits; a UI would route to its login screen).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A request was rejected with 401/403; the stored session is gone.
    Invalidated { status: StatusCode },
    /// The user logged out explicitly.
    LoggedOut,
}

const SESSION_EVENT_CAPACITY: usize = 16;

/// HTTP client wrapper around reqwest with session-aware interceptors.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    session_events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl ApiClient {
    /// Create a new ApiClient.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the moderator API (e.g., "https://admin.example.com/en/api")
    /// * `timeout_secs` - Request timeout in seconds; generous to tolerate image uploads
    pub fn new(base_url: &str, timeout_secs: u64, session: Arc<SessionStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        let (session_events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            session_events,
            cancel: CancellationToken::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    /// Broadcast an explicit logout to subscribers.
    pub(crate) fn notify_logged_out(&self) {
        let _ = self.session_events.send(SessionEvent::LoggedOut);
    }

    /// A clone of this client whose in-flight requests abort when `token`
    /// fires. Tie the token to the lifetime of the issuing view; requests
    /// that already completed keep their outcome.
    pub fn scoped(&self, token: CancellationToken) -> Self {
        let mut scoped = self.clone();
        scoped.cancel = token;
        scoped
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(self.request(Method::DELETE, path)).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Value, ApiError> {
        self.send(self.request(Method::POST, path).multipart(form)).await
    }

    /// Build a request with the auth headers attached: bearer token when the
    /// store holds one, X-CSRFToken when the backend issued a csrf cookie.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut builder = self.http.request(method, url);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(csrf) = self.session.csrf_token() {
            builder = builder.header("X-CSRFToken", csrf);
        }
        builder
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
            result = request.send() => result?,
        };
        self.handle_response(response).await
    }

    async fn handle_response(&self, response: Response) -> Result<Value, ApiError> {
        self.capture_csrf_cookie(&response);

        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            if text.is_empty() {
                return Ok(Value::Null);
            }
            // Callers get the raw text when the body is not JSON.
            Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        } else {
            let body = response
                .text()
                .await
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok());

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                // Teardown strictly precedes the caller seeing the error.
                self.invalidate_session(status);
            } else if status.is_server_error() {
                error!("Server error {}: {:?}", status, body);
            }

            Err(ApiError::Status { status, body })
        }
    }

    fn invalidate_session(&self, status: StatusCode) {
        warn!("Authentication rejected ({}), clearing stored session", status);
        if let Err(err) = self.session.clear() {
            warn!("Failed to clear session store: {}", err);
        }
        let _ = self.session_events.send(SessionEvent::Invalidated { status });
    }

    fn capture_csrf_cookie(&self, response: &Response) {
        for header in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            if let Some(value) = parse_cookie_value(raw, "csrftoken") {
                if let Err(err) = self.session.set_csrf_token(value) {
                    warn!("Failed to store csrf cookie: {}", err);
                }
            }
        }
    }
}

/// Extract a named cookie's value out of a Set-Cookie header line.
fn parse_cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    let first_pair = header.split(';').next()?;
    let (cookie_name, value) = first_pair.split_once('=')?;
    if cookie_name.trim() == name {
        Some(value.trim())
    } else {
        None
    }
}
