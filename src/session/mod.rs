mod cookie_backend;
mod file_backend;
mod models;
mod store;

pub use cookie_backend::CookieBackend;
pub use file_backend::FileBackend;
pub use models::{Permission, PermissionSet, SessionData};
pub use store::{SessionBackend, SessionStore, PERMISSIONS_KEY, TOKEN_KEY, USER_KEY};
