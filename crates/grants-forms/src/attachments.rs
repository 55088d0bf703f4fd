//! Application attachments
//!
//! Form values reference uploaded files by id only; the store owns the file
//! metadata. Names are unique per application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use grants_common::unique_filename;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Attachment and response store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Upload processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    Processing,
    Completed,
    Failed,
}

/// Uploaded file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub download_path: Option<String>,
    pub status: AttachmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Upload request
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub file_size_bytes: u64,
}

impl NewAttachment {
    pub fn new(file_name: impl Into<String>, file_size_bytes: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size_bytes,
        }
    }
}

/// Attachment storage, scoped by application id
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(&self, application_id: &str, upload: NewAttachment) -> StoreResult<Attachment>;
    async fn list(&self, application_id: &str) -> StoreResult<Vec<Attachment>>;
    async fn delete(&self, application_id: &str, attachment_id: Uuid) -> StoreResult<()>;
}

/// In-memory attachment store
pub struct InMemoryAttachmentStore {
    attachments: DashMap<String, Vec<Attachment>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self {
            attachments: DashMap::new(),
        }
    }
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn upload(&self, application_id: &str, upload: NewAttachment) -> StoreResult<Attachment> {
        if upload.file_name.trim().is_empty() {
            return Err(StoreError::Rejected("file name is empty".into()));
        }
        let mut entry = self.attachments.entry(application_id.to_string()).or_default();
        let file_name = unique_filename(&upload.file_name, |candidate| {
            entry.iter().any(|a| a.file_name == candidate)
        });
        if file_name != upload.file_name {
            debug!(application_id, original = %upload.file_name, renamed = %file_name, "renamed duplicate upload");
        }

        let id = Uuid::new_v4();
        let attachment = Attachment {
            id,
            download_path: Some(format!("/applications/{}/attachments/{}", application_id, id)),
            file_name,
            file_size_bytes: upload.file_size_bytes,
            status: AttachmentStatus::Completed,
            created_at: Utc::now(),
        };
        entry.push(attachment.clone());
        info!(application_id, attachment_id = %id, "attachment uploaded");
        Ok(attachment)
    }

    async fn list(&self, application_id: &str) -> StoreResult<Vec<Attachment>> {
        Ok(self
            .attachments
            .get(application_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn delete(&self, application_id: &str, attachment_id: Uuid) -> StoreResult<()> {
        let mut entry = self
            .attachments
            .get_mut(application_id)
            .ok_or_else(|| StoreError::NotFound(application_id.to_string()))?;
        let before = entry.len();
        entry.retain(|a| a.id != attachment_id);
        if entry.len() == before {
            return Err(StoreError::NotFound(attachment_id.to_string()));
        }
        Ok(())
    }
}
