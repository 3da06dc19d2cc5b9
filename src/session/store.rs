//! Dual-backend session persistence.
//!
//! Token, user record and permission set are written to both a durable store
//! and a cookie jar; reads prefer the durable store per field. No network
//! calls happen here.

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use super::models::{PermissionSet, SessionData};

pub const TOKEN_KEY: &str = "moderatorToken";
pub const USER_KEY: &str = "moderatorUser";
pub const PERMISSIONS_KEY: &str = "moderatorPermissions";

/// CSRF cookie issued by the backend; lives only in the cookie jar.
pub const CSRF_KEY: &str = "csrftoken";

const SESSION_KEYS: &[&str] = &[TOKEN_KEY, USER_KEY, PERMISSIONS_KEY];

/// A single key/value storage backend.
///
/// `delete` of a missing key is a no-op, never an error.
pub trait SessionBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Session persistence across a durable backend and a cookie-jar backend.
pub struct SessionStore {
    durable: Box<dyn SessionBackend>,
    cookies: Box<dyn SessionBackend>,
}

impl SessionStore {
    pub fn new(durable: Box<dyn SessionBackend>, cookies: Box<dyn SessionBackend>) -> Self {
        Self { durable, cookies }
    }

    /// Persist token, user and permissions to both backends.
    ///
    /// Durable-store failures propagate; the cookie jar is the redundant
    /// copy, so its failures are logged and tolerated.
    pub fn save(&self, token: &str, user: &Value, permissions: &PermissionSet) -> Result<()> {
        let user_json = serde_json::to_string(user)?;
        let permissions_json = serde_json::to_string(permissions)?;

        self.durable.write(TOKEN_KEY, token)?;
        self.durable.write(USER_KEY, &user_json)?;
        self.durable.write(PERMISSIONS_KEY, &permissions_json)?;

        for (key, value) in [
            (TOKEN_KEY, token),
            (USER_KEY, user_json.as_str()),
            (PERMISSIONS_KEY, permissions_json.as_str()),
        ] {
            if let Err(err) = self.cookies.write(key, value) {
                warn!("Failed to write session cookie {}: {}", key, err);
            }
        }
        Ok(())
    }

    /// Load session values, preferring the durable backend per field.
    pub fn load(&self) -> SessionData {
        SessionData {
            token: self.read_preferring_durable(TOKEN_KEY),
            user: self
                .read_preferring_durable(USER_KEY)
                .and_then(|raw| parse_stored_json(USER_KEY, &raw)),
            permissions: self
                .read_preferring_durable(PERMISSIONS_KEY)
                .and_then(|raw| parse_stored_json(PERMISSIONS_KEY, &raw))
                .and_then(|value| PermissionSet::from_json(&value)),
        }
    }

    /// Stored token, if any. Cheap accessor for the request path.
    pub fn token(&self) -> Option<String> {
        self.read_preferring_durable(TOKEN_KEY)
    }

    /// Remove all session values from both backends. Idempotent.
    ///
    /// Every delete is attempted even if an earlier one fails; the first
    /// error is reported afterwards so a broken backend cannot leave the
    /// other copies behind.
    pub fn clear(&self) -> Result<()> {
        let mut first_error = None;
        for key in SESSION_KEYS {
            for backend in [&self.durable, &self.cookies] {
                if let Err(err) = backend.delete(key) {
                    warn!("Failed to delete {} during session clear: {}", key, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stash the server-issued CSRF cookie. Cookie jar only.
    pub fn set_csrf_token(&self, value: &str) -> Result<()> {
        self.cookies.write(CSRF_KEY, value)
    }

    pub fn csrf_token(&self) -> Option<String> {
        match self.cookies.read(CSRF_KEY) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to read csrf cookie: {}", err);
                None
            }
        }
    }

    fn read_preferring_durable(&self, key: &str) -> Option<String> {
        match self.durable.read(key) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(err) => warn!("Failed to read {} from durable storage: {}", key, err),
        }
        match self.cookies.read(key) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to read {} from cookie jar: {}", key, err);
                None
            }
        }
    }
}

fn parse_stored_json(key: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Discarding unparseable stored value for {}: {}", key, err);
            None
        }
    }
}
