//! Moderator Console Client Library
//!
//! Client-side core for the moderator admin console: session persistence,
//! an authenticated API client, error classification with retries, and the
//! event and image operations built on top of them.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod images;
pub mod session;

// Re-export commonly used types for convenience
pub use auth::{AuthController, AuthMode, Credentials};
pub use client::{ApiClient, SessionEvent};
pub use error::{classify, ApiError, ErrorKind, ErrorOutcome, RetryPolicy};
pub use events::EventsApi;
pub use images::{reconcile, EventImage, ImageId, ImageSync};
pub use session::{CookieBackend, FileBackend, Permission, SessionStore};
