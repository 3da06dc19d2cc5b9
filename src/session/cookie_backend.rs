//! Cookie-jar session storage, the redundant half of the session store.
//!
//! Entries carry the attributes a browser cookie would: an expiry stamped at
//! write time, a fixed path, and the configured domain. Expired entries are
//! dropped on read.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::store::SessionBackend;

/// Retention window applied to every entry at write time.
const COOKIE_RETENTION_DAYS: i64 = 7;

const COOKIE_PATH: &str = "/";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CookieEntry {
    name: String,
    value: String,
    expires_at: DateTime<Utc>,
    path: String,
    domain: Option<String>,
}

impl CookieEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// File-persisted cookie jar scoped to a single domain.
#[derive(Debug, Clone)]
pub struct CookieBackend {
    path: PathBuf,
    /// Domain attribute stamped on every entry; `None` for localhost
    /// deployments, where browsers refuse an explicit domain as well.
    domain: Option<String>,
}

impl CookieBackend {
    pub fn new(path: PathBuf, domain: Option<String>) -> Self {
        Self { path, domain }
    }

    fn load_jar(&self) -> Result<Vec<CookieEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cookie jar: {:?}", self.path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cookie jar: {:?}", self.path))
    }

    fn store_jar(&self, jar: &[CookieEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create storage directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(jar)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write cookie jar: {:?}", self.path))
    }
}

impl SessionBackend for CookieBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        Ok(self
            .load_jar()?
            .into_iter()
            .find(|entry| entry.name == key && !entry.is_expired(now))
            .map(|entry| entry.value))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut jar = self.load_jar()?;
        jar.retain(|entry| entry.name != key);
        jar.push(CookieEntry {
            name: key.to_string(),
            value: value.to_string(),
            expires_at: Utc::now() + Duration::days(COOKIE_RETENTION_DAYS),
            path: COOKIE_PATH.to_string(),
            domain: self.domain.clone(),
        });
        self.store_jar(&jar)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut jar = self.load_jar()?;
        let original_len = jar.len();
        jar.retain(|entry| entry.name != key);
        if jar.len() != original_len {
            self.store_jar(&jar)?;
        }
        Ok(())
    }
}
