//! Durable session storage backed by a single JSON document on disk.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::store::SessionBackend;

/// Key/value store persisted as one JSON object. This is the durable half of
/// the session store; a missing file is simply an empty store.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {:?}", self.path))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {:?}", self.path))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn store_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create storage directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write session file: {:?}", self.path))
    }
}

impl SessionBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let document = self.load_document()?;
        Ok(document.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut document = self.load_document()?;
        document.insert(key.to_string(), Value::String(value.to_string()));
        self.store_document(&document)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut document = self.load_document()?;
        if document.remove(key).is_some() {
            self.store_document(&document)?;
        }
        Ok(())
    }
}
