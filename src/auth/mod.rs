//! Authentication controller: login with retry, logout, startup validation
//! and permission predicates.

mod extract;

pub use extract::{resolve_login_response, ResolvedLogin, TOKEN_FIELDS, USER_FIELDS};

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::{classify, ApiError, RetryPolicy};
use crate::session::{Permission, PermissionSet, SessionStore};

/// How the authenticated session is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Backend issued a bearer token; it rides in the Authorization header.
    Bearer,
    /// Backend authenticates via its own session cookie; the locally
    /// synthesized token only marks the session as live.
    ServerSession,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: Value,
    pub permissions: PermissionSet,
    pub mode: AuthMode,
}

#[derive(Debug, Default)]
struct AuthState {
    user: Option<Value>,
    permissions: PermissionSet,
    /// True only while the startup validation is in flight.
    checking: bool,
}

/// Orchestrates the session lifecycle and exposes authentication state.
pub struct AuthController {
    client: ApiClient,
    session: Arc<SessionStore>,
    retry_policy: RetryPolicy,
    state: RwLock<AuthState>,
}

impl AuthController {
    pub fn new(client: ApiClient) -> Self {
        let session = client.session().clone();
        Self {
            client,
            session,
            retry_policy: RetryPolicy::default(),
            state: RwLock::new(AuthState::default()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// The authenticated principal, if any.
    pub fn user(&self) -> Option<Value> {
        self.state.read().unwrap().user.clone()
    }

    /// Authenticated iff a user record is present.
    pub fn is_authenticated(&self) -> bool {
        self.state.read().unwrap().user.is_some()
    }

    /// True only while the startup session check runs.
    pub fn is_checking(&self) -> bool {
        self.state.read().unwrap().checking
    }

    pub fn permissions(&self) -> PermissionSet {
        self.state
            .read()
            .unwrap()
            .permissions
            .clone()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().has(permission)
    }

    pub fn can_create(&self) -> bool {
        self.permissions().can_create()
    }

    pub fn can_read(&self) -> bool {
        self.permissions().can_read()
    }

    pub fn can_update(&self) -> bool {
        self.permissions().can_update()
    }

    pub fn can_delete(&self) -> bool {
        self.permissions().can_delete()
    }

    /// Startup check: validate a stored token against the profile endpoint.
    ///
    /// Success transitions to authenticated; any failure clears the stored
    /// session so an expired token cannot linger.
    pub async fn validate_session(&self) {
        let token = self.session.token();
        if token.is_none() {
            return;
        }

        self.set_checking(true);
        let result = self.client.get("/v2/auth/profile").await;
        match result {
            Ok(profile) => {
                let permissions = profile
                    .get("permissions")
                    .and_then(PermissionSet::from_json)
                    .unwrap_or_default();
                let mut state = self.state.write().unwrap();
                state.user = Some(profile);
                state.permissions = permissions;
                state.checking = false;
            }
            Err(err) => {
                warn!("Stored session failed validation: {}", err);
                self.clear_local_session();
                self.set_checking(false);
            }
        }
    }

    /// Authenticate with email/password.
    ///
    /// Retryable failures (network, 5xx) are retried with capped exponential
    /// backoff, serialized. Auth-classified failures clear any partial
    /// session before the error surfaces.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginSuccess, ApiError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt_login(credentials).await {
                Ok(success) => {
                    info!("Login succeeded (mode: {:?})", success.mode);
                    return Ok(success);
                }
                Err(err) => {
                    if self.retry_policy.should_retry(&err, attempt) {
                        let delay_ms = self.retry_policy.backoff_ms(attempt);
                        info!(
                            "Login attempt {} failed ({}), retrying in {} ms",
                            attempt + 1,
                            err,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt += 1;
                        continue;
                    }
                    if classify(&err).should_redirect {
                        self.clear_local_session();
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt_login(&self, credentials: &Credentials) -> Result<LoginSuccess, ApiError> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let response = self.client.post("/v2/auth/login", &body).await?;
        let resolved = resolve_login_response(&response)?;

        let permissions = resolved
            .user
            .get("permissions")
            .and_then(PermissionSet::from_json)
            .unwrap_or_else(PermissionSet::default_after_login);

        self.session
            .save(&resolved.token, &resolved.user, &permissions)?;

        {
            let mut state = self.state.write().unwrap();
            state.user = Some(resolved.user.clone());
            state.permissions = permissions.clone();
        }

        Ok(LoginSuccess {
            user: resolved.user,
            permissions,
            mode: resolved.mode,
        })
    }

    /// Drop the session locally and notify subscribers. No network call.
    pub fn logout(&self) {
        self.clear_local_session();
        self.client.notify_logged_out();
    }

    fn clear_local_session(&self) {
        if let Err(err) = self.session.clear() {
            warn!("Failed to clear session store: {}", err);
        }
        let mut state = self.state.write().unwrap();
        state.user = None;
        state.permissions = PermissionSet::default();
    }

    fn set_checking(&self, checking: bool) {
        self.state.write().unwrap().checking = checking;
    }
}
