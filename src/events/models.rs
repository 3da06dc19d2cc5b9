use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Company record derived from the staff profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyInfo {
    pub id: Option<u64>,
    pub name: String,
    pub description: Option<String>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
}

impl CompanyInfo {
    /// Placeholder used when the profile fetch fails during a dashboard
    /// load; the dashboard renders with it instead of failing outright.
    pub fn placeholder() -> Self {
        Self {
            id: None,
            name: "Unknown Company".to_string(),
            description: None,
            is_verified: None,
            is_active: None,
            email: None,
            phone: None,
            address: None,
            website: None,
        }
    }

    /// Human readable verification state, "unknown" when the profile
    /// payload carried no flag.
    pub fn verification_label(&self) -> &'static str {
        match self.is_verified {
            Some(true) => "verified",
            Some(false) => "unverified",
            None => "unknown",
        }
    }

    /// Build company info out of a profile payload, tolerating both the
    /// `companies[]` array shape and flat `company_*` fields.
    pub fn from_profile(profile: &Value) -> Self {
        let company = profile
            .get("companies")
            .and_then(Value::as_array)
            .and_then(|companies| companies.first())
            .cloned()
            .unwrap_or(Value::Null);

        let string_field = |value: &Value, key: &str| {
            value.get(key).and_then(Value::as_str).map(str::to_string)
        };
        let nested_or_flat = |nested_key: &str, flat_key: &str| {
            profile
                .get("company")
                .and_then(|company| company.get(nested_key))
                .or_else(|| profile.get(flat_key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            id: company
                .get("id")
                .or_else(|| profile.get("company_id"))
                .and_then(Value::as_u64),
            name: string_field(&company, "name")
                .or_else(|| string_field(profile, "company_name"))
                .unwrap_or_else(|| "Unknown Company".to_string()),
            description: string_field(&company, "description"),
            is_verified: company.get("is_verified").and_then(Value::as_bool),
            is_active: company.get("is_active").and_then(Value::as_bool),
            email: nested_or_flat("email", "company_email"),
            phone: nested_or_flat("phone", "company_phone"),
            address: nested_or_flat("address", "company_address"),
            website: nested_or_flat("website", "company_website"),
        }
    }
}

/// Aggregate counts derived from the events list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_events: usize,
    pub active_events: usize,
}

impl DashboardStats {
    pub fn from_events(events: &[Value]) -> Self {
        let active_events = events
            .iter()
            .filter(|event| event.get("is_active").and_then(Value::as_bool) != Some(false))
            .count();
        Self {
            total_events: events.len(),
            active_events,
        }
    }
}

/// Result of the dashboard fan-out load. Each branch degrades
/// independently: a failed secondary fetch leaves an empty list or the
/// placeholder company record.
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub events: Vec<Value>,
    pub categories: Vec<Value>,
    pub cities: Vec<Value>,
    pub countries: Vec<Value>,
    pub company: CompanyInfo,
    pub stats: DashboardStats,
}
