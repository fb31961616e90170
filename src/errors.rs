use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid file type: {path}. Only image and video files are supported.")]
    InvalidFileType { path: String },

    #[error("File too large: {path} ({size} bytes, limit {limit} bytes)")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("Image encoding failed: {0}")]
    Encoding(String),

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Storage rejected {path} with status {status}: {message}")]
    StorageRejected {
        path: String,
        status: u16,
        message: String,
    },

    #[error("Invalid storage path: {path}")]
    InvalidStoragePath { path: String },

    #[error("Rate limit exceeded. Retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Upload item not found: {id}")]
    ItemNotFound { id: Uuid },

    #[error("Upload item {id} is {status} and cannot be {action}")]
    ItemBusy {
        id: Uuid,
        status: String,
        action: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::FileNotFound {
            path: path.to_string(),
        }
    }

    pub fn invalid_file_type(path: &str) -> Self {
        Self::InvalidFileType {
            path: path.to_string(),
        }
    }

    pub fn file_too_large(path: &str, size: u64, limit: u64) -> Self {
        Self::FileTooLarge {
            path: path.to_string(),
            size,
            limit,
        }
    }

    pub fn upload_failed(reason: impl Into<String>) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    pub fn item_busy(id: Uuid, status: &str, action: &str) -> Self {
        Self::ItemBusy {
            id,
            status: status.to_string(),
            action: action.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_)
                | AppError::RateLimit { .. }
                | AppError::UploadFailed { .. }
                | AppError::Io(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::FileNotFound { .. }
                | AppError::InvalidFileType { .. }
                | AppError::FileTooLarge { .. }
                | AppError::StorageRejected { .. }
                | AppError::InvalidStoragePath { .. }
                | AppError::Validation { .. }
        )
    }
}
