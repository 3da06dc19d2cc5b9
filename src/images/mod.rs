//! Event image collection: reconciliation of local edits against server
//! state, the sequential best-effort sync loop, and the optimistic
//! set-primary path.

use std::path::PathBuf;

use rand::Rng;
use rand_distr::Alphanumeric;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::{classify, ApiError, ErrorOutcome};

/// Identity of an image entry.
///
/// Server-persisted images carry numeric ids; images added locally get a
/// temporary id until their upload round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageId {
    Persisted(u64),
    Temporary(String),
}

impl ImageId {
    /// Fresh temporary id: `temp_<millis>_<random>`.
    pub fn temporary() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        ImageId::Temporary(format!(
            "temp_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            suffix
        ))
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_u64().map(ImageId::Persisted),
            Value::String(raw) => match raw.parse::<u64>() {
                Ok(id) => Some(ImageId::Persisted(id)),
                Err(_) => Some(ImageId::Temporary(raw.clone())),
            },
            _ => None,
        }
    }

    pub fn as_persisted(&self) -> Option<u64> {
        match self {
            ImageId::Persisted(id) => Some(*id),
            ImageId::Temporary(_) => None,
        }
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageId::Persisted(id) => write!(f, "{}", id),
            ImageId::Temporary(id) => write!(f, "{}", id),
        }
    }
}

/// Where the binary content of a not-yet-uploaded image lives.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Memory(Vec<u8>),
    File(PathBuf),
}

/// One entry of an event's image collection.
#[derive(Debug, Clone)]
pub struct EventImage {
    pub id: ImageId,
    pub url: String,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    /// True until the create call round-trips successfully.
    pub is_temporary: bool,
    /// Local payload backing a pending upload. Server images have none.
    pub source: Option<ImageSource>,
}

impl EventImage {
    /// A locally added image pending upload.
    pub fn new_local(source: ImageSource, alt_text: Option<String>) -> Self {
        let url = match &source {
            ImageSource::File(path) => format!("file://{}", path.display()),
            ImageSource::Memory(_) => "blob:local".to_string(),
        };
        Self {
            id: ImageId::temporary(),
            url,
            alt_text,
            is_primary: false,
            is_temporary: true,
            source: Some(source),
        }
    }

    /// Parse a server image record. Returns None when the record has no id.
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = ImageId::from_json(value.get("id")?)?;
        let url = value
            .get("url")
            .or_else(|| value.get("image"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            id,
            url,
            alt_text: value
                .get("alt_text")
                .and_then(Value::as_str)
                .map(str::to_string),
            is_primary: value
                .get("is_primary")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            is_temporary: false,
            source: None,
        })
    }

    /// True when this entry still lives on this machine only: it carries a
    /// payload, or its url points at a local preview.
    pub fn is_local(&self) -> bool {
        self.source.is_some() || self.url.starts_with("blob:") || self.url.starts_with("file:")
    }

    /// Binary content for the upload, recovered from the preview path when
    /// the original in-memory payload was not retained.
    async fn payload_bytes(&self) -> Result<Vec<u8>, ApiError> {
        match &self.source {
            Some(ImageSource::Memory(bytes)) => Ok(bytes.clone()),
            Some(ImageSource::File(path)) => read_local_file(path).await,
            None => {
                let path = self.url.strip_prefix("file://").ok_or_else(|| {
                    ApiError::Contract(format!(
                        "Image {} has no local payload to upload",
                        self.id
                    ))
                })?;
                read_local_file(&PathBuf::from(path)).await
            }
        }
    }
}

async fn read_local_file(path: &PathBuf) -> Result<Vec<u8>, ApiError> {
    tokio::fs::read(path).await.map_err(|err| {
        ApiError::Storage(anyhow::anyhow!("Failed to read image file {:?}: {}", path, err))
    })
}

/// Minimal set of server operations moving `previous` to `desired`.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub to_create: Vec<EventImage>,
    pub to_delete: Vec<EventImage>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Diff two image collections by id, unordered.
///
/// An entry counts as new when its id matches no previous entry and it
/// carries a local payload; entries whose id vanished from `desired` are
/// deletions.
pub fn reconcile(previous: &[EventImage], desired: &[EventImage]) -> ReconcilePlan {
    let to_create = desired
        .iter()
        .filter(|image| !previous.iter().any(|existing| existing.id == image.id))
        .filter(|image| image.is_local())
        .cloned()
        .collect();

    let to_delete = previous
        .iter()
        .filter(|image| !desired.iter().any(|kept| kept.id == image.id))
        .cloned()
        .collect();

    ReconcilePlan { to_create, to_delete }
}

/// Which half of the sync an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Upload,
    Delete,
}

/// One failed item of a sync batch.
#[derive(Debug)]
pub struct SyncFailure {
    pub image_id: ImageId,
    pub operation: SyncOperation,
    pub outcome: ErrorOutcome,
}

/// Outcome of a sync batch.
#[derive(Debug)]
pub struct SyncReport {
    pub uploaded: usize,
    pub deleted: usize,
    pub failures: Vec<SyncFailure>,
    /// The collection as it stands after the batch: server truth when any
    /// operation ran, the desired list verbatim otherwise.
    pub images: Vec<EventImage>,
}

/// Drives image-collection edits against the server.
#[derive(Clone)]
pub struct ImageSync {
    client: ApiClient,
}

impl ImageSync {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Apply the diff between `previous` and `desired` to the server.
    ///
    /// Creates and deletes run sequentially; a failed item is recorded and
    /// the batch continues. When anything ran, the authoritative list is
    /// re-fetched from event details, so local state converges to server
    /// truth even after partial failures. A metadata-only change adopts
    /// `desired` directly.
    pub async fn sync(
        &self,
        event_id: u64,
        previous: &[EventImage],
        desired: &[EventImage],
    ) -> Result<SyncReport, ApiError> {
        let plan = reconcile(previous, desired);
        if plan.is_empty() {
            debug!("No image changes for event {}, adopting desired list", event_id);
            return Ok(SyncReport {
                uploaded: 0,
                deleted: 0,
                failures: Vec::new(),
                images: desired.to_vec(),
            });
        }

        let mut uploaded = 0;
        let mut deleted = 0;
        let mut failures = Vec::new();

        for image in &plan.to_create {
            match self.upload(event_id, image).await {
                Ok(_) => {
                    info!("Uploaded image {} to event {}", image.id, event_id);
                    uploaded += 1;
                }
                Err(err) => {
                    warn!("Failed to upload image {}: {}", image.id, err);
                    failures.push(SyncFailure {
                        image_id: image.id.clone(),
                        operation: SyncOperation::Upload,
                        outcome: classify(&err),
                    });
                }
            }
        }

        for image in &plan.to_delete {
            let Some(image_id) = image.id.as_persisted() else {
                // Never uploaded, nothing to delete server-side.
                debug!("Skipping delete of temporary image {}", image.id);
                continue;
            };
            let path = format!("/v2/event/admin/event/{}/image/{}", event_id, image_id);
            match self.client.delete(&path).await {
                Ok(_) => {
                    info!("Deleted image {} from event {}", image_id, event_id);
                    deleted += 1;
                }
                Err(err) => {
                    warn!("Failed to delete image {}: {}", image_id, err);
                    failures.push(SyncFailure {
                        image_id: image.id.clone(),
                        operation: SyncOperation::Delete,
                        outcome: classify(&err),
                    });
                }
            }
        }

        // Server state is authoritative after a batch, partial failures
        // included.
        let images = self.fetch_images(event_id).await?;

        Ok(SyncReport {
            uploaded,
            deleted,
            failures,
            images,
        })
    }

    /// The event's image list as the server currently has it.
    pub async fn fetch_images(&self, event_id: u64) -> Result<Vec<EventImage>, ApiError> {
        let details = self
            .client
            .get(&format!("/v2/event/details/{}", event_id))
            .await?;
        Ok(extract_images(&details))
    }

    /// Update image metadata (alt text, primary flag) in place.
    pub async fn update_image(
        &self,
        event_id: u64,
        image_id: u64,
        metadata: &Value,
    ) -> Result<Value, ApiError> {
        self.client
            .put(
                &format!("/v2/event/admin/event/{}/image/{}", event_id, image_id),
                metadata,
            )
            .await
    }

    /// Mark one image as the event's primary.
    ///
    /// Single-field, single-target mutation: on success the local list is
    /// updated optimistically, no re-fetch. Exactly the target ends up
    /// primary.
    pub async fn set_primary(
        &self,
        event_id: u64,
        image_id: u64,
        images: &mut [EventImage],
    ) -> Result<(), ApiError> {
        let path = format!(
            "/v2/event/company/events/{}/images/update/{}",
            event_id, image_id
        );
        self.client
            .patch(&path, &serde_json::json!({"is_primary": true}))
            .await?;

        for image in images.iter_mut() {
            image.is_primary = image.id == ImageId::Persisted(image_id);
        }
        Ok(())
    }

    async fn upload(&self, event_id: u64, image: &EventImage) -> Result<Value, ApiError> {
        let bytes = image.payload_bytes().await?;
        let alt_text = image.alt_text.clone().unwrap_or_default();
        let file_name = if alt_text.is_empty() {
            "image.jpg".to_string()
        } else {
            alt_text.clone()
        };

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("alt_text", alt_text);

        self.client
            .post_multipart(&format!("/v2/event/{}/images", event_id), form)
            .await
    }
}

/// Images array out of an event-details payload (`images` or
/// `data.images`).
fn extract_images(details: &Value) -> Vec<EventImage> {
    let images = details
        .get("images")
        .and_then(Value::as_array)
        .or_else(|| {
            details
                .get("data")
                .and_then(|data| data.get("images"))
                .and_then(Value::as_array)
        });
    images
        .map(|entries| entries.iter().filter_map(EventImage::from_json).collect())
        .unwrap_or_default()
}
