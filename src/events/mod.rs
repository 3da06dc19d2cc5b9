//! Events API surface: company resolution, event CRUD and the dashboard
//! fan-out load.

mod models;

pub use models::{CompanyInfo, DashboardData, DashboardStats};

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::error::ApiError;

/// Client for the company-scoped event endpoints.
#[derive(Clone)]
pub struct EventsApi {
    client: ApiClient,
}

impl EventsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Resolve the company id for the given user record.
    ///
    /// Walks the candidate fields of the user payload first and falls back
    /// to re-fetching the staff profile when none yields a usable id.
    pub async fn company_id(&self, user: &Value) -> Result<u64, ApiError> {
        if let Some(id) = company_id_from(user) {
            debug!("Resolved company id {} from user record", id);
            return Ok(id);
        }

        debug!("User record has no company id, fetching staff profile");
        let profile = self.client.get("/v2/auth/profile").await?;
        company_id_from(&profile).ok_or_else(|| {
            ApiError::Contract(
                "Company ID not found. Please ensure you are properly authenticated.".to_string(),
            )
        })
    }

    /// Company record from the staff profile.
    pub async fn company_info(&self) -> Result<CompanyInfo, ApiError> {
        let profile = self.client.get("/v2/auth/profile").await?;
        Ok(CompanyInfo::from_profile(&profile))
    }

    /// All events of the user's company.
    pub async fn list_events(&self, user: &Value) -> Result<Vec<Value>, ApiError> {
        let company_id = self.company_id(user).await?;
        let response = self
            .client
            .get(&format!("/v2/event/{}/list", company_id))
            .await?;
        Ok(extract_list(&response))
    }

    pub async fn create_event(&self, user: &Value, event: &Value) -> Result<Value, ApiError> {
        let company_id = self.company_id(user).await?;
        self.client
            .post(&format!("/v2/event/{}/create", company_id), event)
            .await
    }

    pub async fn update_event(&self, event_id: u64, event: &Value) -> Result<Value, ApiError> {
        self.client
            .patch(&format!("/v2/event/update/{}", event_id), event)
            .await
    }

    pub async fn delete_event(&self, event_id: u64) -> Result<(), ApiError> {
        self.client
            .delete(&format!("/v2/event/company/events/{}/delete", event_id))
            .await?;
        Ok(())
    }

    pub async fn event_details(&self, event_id: u64) -> Result<Value, ApiError> {
        self.client
            .get(&format!("/v2/event/details/{}", event_id))
            .await
    }

    /// Fan-out load of everything the dashboard shows.
    ///
    /// All five fetches run concurrently and settle independently: a failed
    /// branch degrades to an empty list (or the placeholder company record)
    /// with a warning, it never cancels or fails the others.
    pub async fn load_dashboard(&self, user: &Value) -> DashboardData {
        let (events, categories, cities, countries, company) = tokio::join!(
            self.list_events(user),
            self.client.get("/category/list/"),
            self.client.get("/city/admin/list/"),
            self.client.get("/v2/country/list"),
            self.company_info(),
        );

        let events = events.unwrap_or_else(|err| {
            warn!("Dashboard events fetch failed: {}", err);
            Vec::new()
        });
        let stats = DashboardStats::from_events(&events);

        DashboardData {
            stats,
            events,
            categories: settle_list("categories", categories),
            cities: settle_list("cities", cities),
            countries: settle_list("countries", countries),
            company: company.unwrap_or_else(|err| {
                warn!("Dashboard company info fetch failed: {}", err);
                CompanyInfo::placeholder()
            }),
        }
    }
}

fn settle_list(what: &str, result: Result<Value, ApiError>) -> Vec<Value> {
    match result {
        Ok(response) => extract_list(&response),
        Err(err) => {
            warn!("Dashboard {} fetch failed: {}", what, err);
            Vec::new()
        }
    }
}

/// Pull a list out of the response, whatever envelope the endpoint used:
/// a bare array, or an array under `results`, `events` or `data`.
fn extract_list(response: &Value) -> Vec<Value> {
    if let Some(items) = response.as_array() {
        return items.clone();
    }
    for key in ["results", "events", "data"] {
        if let Some(items) = response.get(key).and_then(Value::as_array) {
            return items.clone();
        }
    }
    Vec::new()
}

/// Candidate fields for the company id, in priority order:
/// `companies[0].id`, `company.id`, `company_id`, `user_id`, `id`.
/// Only positive integers qualify; ids may arrive as numbers or strings.
fn company_id_from(user: &Value) -> Option<u64> {
    let candidates = [
        user.get("companies")
            .and_then(Value::as_array)
            .and_then(|companies| companies.first())
            .and_then(|company| company.get("id")),
        user.get("company").and_then(|company| company.get("id")),
        user.get("company_id"),
        user.get("user_id"),
        user.get("id"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(as_positive_integer)
}

fn as_positive_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().filter(|id| *id > 0),
        Value::String(raw) => raw.parse::<u64>().ok().filter(|id| *id > 0),
        _ => None,
    }
}
