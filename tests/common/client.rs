//! Client-side harness for end-to-end tests
//!
//! Builds the full client stack (session store on a temp dir, API client,
//! auth controller) against a mock server. The retry policy is shortened
//! so retry paths run in milliseconds.

use super::constants::*;
use moderator_console_client::auth::{AuthController, Credentials, LoginSuccess};
use moderator_console_client::client::ApiClient;
use moderator_console_client::error::RetryPolicy;
use moderator_console_client::session::{CookieBackend, FileBackend, SessionStore};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    pub session: Arc<SessionStore>,
    pub client: ApiClient,
    pub auth: AuthController,

    // Keep the storage dir alive until drop
    _storage_dir: TempDir,
}

// Each integration test binary compiles its own copy of this module, so
// not every helper is used everywhere.
#[allow(dead_code)]
impl TestHarness {
    pub fn new(base_url: &str) -> Self {
        Self::with_retry(base_url, fast_retry())
    }

    pub fn with_retry(base_url: &str, retry: RetryPolicy) -> Self {
        let storage_dir = TempDir::new().expect("Failed to create storage dir");
        let session = Arc::new(SessionStore::new(
            Box::new(FileBackend::new(storage_dir.path().join("session.json"))),
            Box::new(CookieBackend::new(
                storage_dir.path().join("cookies.json"),
                None,
            )),
        ));
        let client = ApiClient::new(base_url, REQUEST_TIMEOUT_SECS, session.clone())
            .expect("Failed to build API client");
        let auth = AuthController::new(client.clone()).with_retry_policy(retry);

        Self {
            session,
            client,
            auth,
            _storage_dir: storage_dir,
        }
    }

    /// A harness that already completed a login against the mock.
    pub async fn logged_in(base_url: &str) -> (Self, LoginSuccess) {
        let harness = Self::new(base_url);
        let success = harness
            .auth
            .login(&credentials())
            .await
            .expect("Login against the mock failed");
        (harness, success)
    }

    /// A second controller over the same persisted session files,
    /// simulating a fresh process start.
    pub fn reopened(&self, base_url: &str) -> Self {
        let session = Arc::new(SessionStore::new(
            Box::new(FileBackend::new(
                self._storage_dir.path().join("session.json"),
            )),
            Box::new(CookieBackend::new(
                self._storage_dir.path().join("cookies.json"),
                None,
            )),
        ));
        let client = ApiClient::new(base_url, REQUEST_TIMEOUT_SECS, session.clone())
            .expect("Failed to build API client");
        let auth = AuthController::new(client.clone()).with_retry_policy(fast_retry());

        Self {
            session,
            client,
            auth,
            _storage_dir: TempDir::new().expect("Failed to create storage dir"),
        }
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        email: TEST_EMAIL.to_string(),
        password: TEST_PASSWORD.to_string(),
    }
}

/// The production backoff curve compressed to milliseconds.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        backoff_multiplier: 2.0,
    }
}
