//! Error taxonomy, classification and retry policy for API calls.
//!
//! Every failed HTTP call is reduced to an [`ApiError`], which [`classify`]
//! maps to a user-displayable [`ErrorOutcome`] with retry/redirect guidance.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Error returned by the API client and everything built on top of it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No HTTP response was received (connect failure, DNS, timeout).
    #[error("request failed before a response was received: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("server returned HTTP {status}")]
    Status {
        status: StatusCode,
        /// Parsed response body, when the server sent one we could decode.
        body: Option<Value>,
    },

    /// The request was aborted through its cancellation token.
    #[error("request cancelled")]
    Cancelled,

    /// The response decoded fine but did not match the expected contract.
    #[error("unexpected response shape: {0}")]
    Contract(String),

    /// Local session storage failed while persisting or clearing state.
    #[error("local storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(err)
    }
}

impl ApiError {
    /// Status code of the response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for errors that a caller-side retry loop may retry:
    /// no response at all, or status in {500, 502, 503, 504}.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => matches!(status.as_u16(), 500 | 502 | 503 | 504),
            ApiError::Cancelled | ApiError::Contract(_) | ApiError::Storage(_) => false,
        }
    }
}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Validation,
    Auth,
    Permission,
    NotFound,
    Server,
    ServiceUnavailable,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Server => "server",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Classified outcome of a failed API call.
#[derive(Debug, Clone)]
pub struct ErrorOutcome {
    pub kind: ErrorKind,
    /// Human-readable message suitable for direct display.
    pub message: String,
    pub should_retry: bool,
    /// True when the failure invalidates the session and the caller should
    /// send the user back to the login screen.
    pub should_redirect: bool,
    /// Raw server payload, when one was present.
    pub details: Option<Value>,
}

/// Extract the server-provided message from an error body, if any.
/// Backends use either `detail` or `message` for this.
fn server_message(body: &Option<Value>) -> Option<String> {
    let body = body.as_ref()?;
    body.get("detail")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Map a failed call to its typed outcome.
pub fn classify(error: &ApiError) -> ErrorOutcome {
    let (status, body) = match error {
        ApiError::Status { status, body } => (*status, body.clone()),
        ApiError::Transport(_) => {
            return ErrorOutcome {
                kind: ErrorKind::Network,
                message: "Network error. Please check your internet connection.".to_string(),
                should_retry: true,
                should_redirect: false,
                details: None,
            };
        }
        ApiError::Cancelled => {
            return ErrorOutcome {
                kind: ErrorKind::Unknown,
                message: "The request was cancelled.".to_string(),
                should_retry: false,
                should_redirect: false,
                details: None,
            };
        }
        ApiError::Contract(msg) => {
            return ErrorOutcome {
                kind: ErrorKind::Unknown,
                message: msg.clone(),
                should_retry: false,
                should_redirect: false,
                details: None,
            };
        }
        ApiError::Storage(err) => {
            return ErrorOutcome {
                kind: ErrorKind::Unknown,
                message: format!("Local storage error: {}", err),
                should_retry: false,
                should_redirect: false,
                details: None,
            };
        }
    };

    match status.as_u16() {
        400 => ErrorOutcome {
            kind: ErrorKind::Validation,
            message: server_message(&body)
                .unwrap_or_else(|| "Invalid request. Please check your input.".to_string()),
            should_retry: false,
            should_redirect: false,
            details: body,
        },
        401 => ErrorOutcome {
            kind: ErrorKind::Auth,
            message: "Authentication failed. Please log in again.".to_string(),
            should_retry: false,
            should_redirect: true,
            details: body,
        },
        403 => ErrorOutcome {
            kind: ErrorKind::Permission,
            message: "Access denied. You don't have permission to perform this action."
                .to_string(),
            should_retry: false,
            should_redirect: false,
            details: body,
        },
        404 => ErrorOutcome {
            kind: ErrorKind::NotFound,
            message: "Resource not found. Please check the URL or contact support.".to_string(),
            should_retry: false,
            should_redirect: false,
            details: body,
        },
        500 => ErrorOutcome {
            kind: ErrorKind::Server,
            message: "Server error. Please try again later or contact support.".to_string(),
            should_retry: true,
            should_redirect: false,
            details: body,
        },
        502 | 503 | 504 => ErrorOutcome {
            kind: ErrorKind::ServiceUnavailable,
            message: "Service temporarily unavailable. Please try again later.".to_string(),
            should_retry: true,
            should_redirect: false,
            details: body,
        },
        code => ErrorOutcome {
            kind: ErrorKind::Unknown,
            message: format!("Unexpected error ({}). Please try again or contact support.", code),
            should_retry: false,
            should_redirect: false,
            details: body,
        },
    }
}

/// Retry policy implementing capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of additional attempts after the first failure.
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds (cap for exponential growth).
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Calculate backoff duration in milliseconds for a given attempt index.
    ///
    /// Uses exponential backoff: `initial_backoff * multiplier^attempt`,
    /// capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        backoff.min(self.max_backoff_ms as f64) as u64
    }

    /// Check if an error should be retried given how many retries already ran.
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 16000,
            backoff_multiplier: 2.0,
        }
    }
}
