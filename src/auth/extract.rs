//! Tolerant extraction of token and user data from login responses.
//!
//! Backends in the wild disagree on the field names they use, so extraction
//! walks explicit candidate lists in order instead of assuming one shape.

use rand::Rng;
use rand_distr::Alphanumeric;
use serde_json::Value;

use crate::error::ApiError;

use super::AuthMode;

/// Field names under which a bearer token may arrive, in match order.
pub const TOKEN_FIELDS: &[&str] = &["token", "access_token", "auth_token", "access", "jwt"];

/// Field names under which the user payload may arrive, in match order.
/// When none matches, the whole response body is treated as the user.
pub const USER_FIELDS: &[&str] = &["user", "user_data", "profile"];

/// Login response reduced to its canonical parts.
#[derive(Debug, Clone)]
pub struct ResolvedLogin {
    pub token: String,
    pub user: Value,
    pub mode: AuthMode,
}

/// First token candidate present in the response, if any.
pub fn extract_token(body: &Value) -> Option<String> {
    TOKEN_FIELDS
        .iter()
        .find_map(|field| body.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// First user-payload candidate, falling back to the whole body.
pub fn extract_user(body: &Value) -> Option<Value> {
    USER_FIELDS
        .iter()
        .find_map(|field| body.get(field))
        .filter(|value| value.is_object())
        .cloned()
        .or_else(|| body.is_object().then(|| body.clone()))
}

/// True when the payload carries enough to identify a principal.
fn identifies_user(user: &Value) -> bool {
    user.get("id").is_some() || user.get("email").is_some()
}

fn top_level_fields(body: &Value) -> String {
    match body.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
        None => "<non-object response>".to_string(),
    }
}

/// Process-local token standing in for a bearer credential when the backend
/// authenticates through its session cookie instead.
fn synthesize_session_token() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("session_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}

/// Resolve a login response body into token, user and auth mode.
///
/// A response with a recognized token field authenticates in bearer mode.
/// A token-less response still succeeds when the user payload is
/// identifiable (`id` or `email` present); the session then runs on the
/// backend's cookie and a synthesized local token. Anything else fails with
/// a message naming the fields the response actually had.
pub fn resolve_login_response(body: &Value) -> Result<ResolvedLogin, ApiError> {
    let user = extract_user(body);

    if let Some(token) = extract_token(body) {
        let user = user.unwrap_or(Value::Null);
        return Ok(ResolvedLogin {
            token,
            user,
            mode: AuthMode::Bearer,
        });
    }

    if let Some(user) = user.filter(identifies_user) {
        return Ok(ResolvedLogin {
            token: synthesize_session_token(),
            user,
            mode: AuthMode::ServerSession,
        });
    }

    Err(ApiError::Contract(format!(
        "No authentication token received from server. Response fields: {}",
        top_level_fields(body)
    )))
}
