use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability tokens granted to a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Update,
    Create,
    Delete,
    Admin,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Update => "update",
            Permission::Create => "create",
            Permission::Delete => "delete",
            Permission::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Permission::Read),
            "update" => Some(Permission::Update),
            "create" => Some(Permission::Create),
            "delete" => Some(Permission::Delete),
            "admin" => Some(Permission::Admin),
            _ => None,
        }
    }
}

/// Set of permission strings as issued by the backend.
///
/// Entries the client does not recognize are kept verbatim so that a
/// round-trip through storage never loses grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    entries: Vec<String>,
}

impl PermissionSet {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Permissions assigned when a successful login response carries none.
    pub fn default_after_login() -> Self {
        Self::new(vec!["read".to_string(), "update".to_string()])
    }

    /// Parse a permission list out of a JSON array of strings.
    /// Non-string entries are skipped.
    pub fn from_json(value: &Value) -> Option<Self> {
        let entries = value
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        Some(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.has_str(permission.as_str())
    }

    pub fn has_str(&self, permission: &str) -> bool {
        self.entries.iter().any(|entry| entry == permission)
    }

    /// `admin` overrides each of the four granular capabilities.
    fn has_or_admin(&self, permission: Permission) -> bool {
        self.has(permission) || self.has(Permission::Admin)
    }

    pub fn can_create(&self) -> bool {
        self.has_or_admin(Permission::Create)
    }

    pub fn can_read(&self) -> bool {
        self.has_or_admin(Permission::Read)
    }

    pub fn can_update(&self) -> bool {
        self.has_or_admin(Permission::Update)
    }

    pub fn can_delete(&self) -> bool {
        self.has_or_admin(Permission::Delete)
    }
}

/// Session values as loaded from local storage.
///
/// Fields are independently optional: a token can exist without a validated
/// user while the startup check is still in flight.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub token: Option<String>,
    pub user: Option<Value>,
    pub permissions: Option<PermissionSet>,
}
