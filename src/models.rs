use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    /// Folder name used in storage paths
    pub fn folder(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photos",
            MediaKind::Video => "videos",
        }
    }
}

/// Records a piece of media belongs to. The shelter id is the tenant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    pub shelter_id: String,
    pub animal_id: String,
    pub kennel_id: String,
    pub room_id: String,
    #[serde(default)]
    pub walk_id: Option<String>,
}

/// A processed file ready to be handed to the queue.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewUpload {
    pub file_path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub target: MediaTarget,
    #[serde(default)]
    pub is_intake: bool,
}

/// One queued upload and its lifecycle state.
///
/// `uploaded_url` is only present while `status` is `Success` and `error`
/// only while `status` is `Error`; the transition methods below keep the two
/// in step with the status.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadItem {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub target: MediaTarget,
    pub is_intake: bool,
    pub status: UploadStatus,
    pub progress: u8,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub uploaded_url: Option<String>,
    pub error: Option<String>,
}

impl UploadItem {
    pub fn from_new(upload: NewUpload) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: upload.file_path,
            file_name: upload.file_name,
            content_type: upload.content_type,
            kind: upload.kind,
            file_size: upload.file_size,
            width: upload.width,
            height: upload.height,
            target: upload.target,
            is_intake: upload.is_intake,
            status: UploadStatus::Pending,
            progress: 0,
            retry_count: 0,
            created_at: Utc::now(),
            uploaded_url: None,
            error: None,
        }
    }

    pub(crate) fn mark_uploading(&mut self) {
        self.status = UploadStatus::Uploading;
        self.progress = 0;
        self.uploaded_url = None;
        self.error = None;
    }

    pub(crate) fn mark_success(&mut self, url: String) {
        self.status = UploadStatus::Success;
        self.progress = 100;
        self.uploaded_url = Some(url);
        self.error = None;
    }

    pub(crate) fn mark_error(&mut self, message: String) {
        let message = if message.trim().is_empty() {
            "Upload failed".to_string()
        } else {
            message
        };
        self.status = UploadStatus::Error;
        self.uploaded_url = None;
        self.error = Some(message);
    }

    /// Back to pending with a fresh retry budget
    pub(crate) fn reset_to_pending(&mut self) {
        self.status = UploadStatus::Pending;
        self.progress = 0;
        self.retry_count = 0;
        self.uploaded_url = None;
        self.error = None;
    }

    /// True when the optional fields agree with the status.
    pub fn is_consistent(&self) -> bool {
        let url_ok = match self.status {
            UploadStatus::Success => self
                .uploaded_url
                .as_deref()
                .map_or(false, |u| !u.is_empty()),
            _ => self.uploaded_url.is_none(),
        };
        let error_ok = match self.status {
            UploadStatus::Error => self.error.as_deref().map_or(false, |e| !e.is_empty()),
            _ => self.error.is_none(),
        };
        url_ok && error_ok && self.progress <= 100
    }

    pub fn extension(&self) -> &str {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(match self.kind {
                MediaKind::Photo => "jpg",
                MediaKind::Video => "mp4",
            })
    }
}

/// Per-status totals for the UI badge
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub uploading: usize,
    pub success: usize,
    pub error: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.uploading + self.success + self.error
    }

    /// Items still waiting for or in the middle of an upload
    pub fn active(&self) -> usize {
        self.pending + self.uploading
    }
}
