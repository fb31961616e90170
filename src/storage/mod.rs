//! Remote object storage used by the upload queue.
//!
//! Paths are tenant-scoped: `{shelter}/animals/{animal}/{photos|videos}/{item}.{ext}`,
//! with an extra `intake/` segment for media captured on the intake form.

pub mod http_client;
pub mod local;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::errors::{AppError, AppResult};
use crate::models::UploadItem;

pub use http_client::HttpStorageClient;
pub use local::LocalStorageClient;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Store `data` at `path` and return its public URL
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> AppResult<String>;

    /// Public URL for an object path, whether or not it exists yet
    fn public_url(&self, path: &str) -> String;

    async fn delete(&self, path: &str) -> AppResult<()>;
}

/// Storage path for an item
pub fn build_storage_path(item: &UploadItem) -> String {
    let target = &item.target;
    let intake = if item.is_intake { "intake/" } else { "" };
    format!(
        "{}/animals/{}/{}{}/{}.{}",
        target.shelter_id,
        target.animal_id,
        intake,
        item.kind.folder(),
        item.id,
        item.extension().to_lowercase()
    )
}

pub(crate) fn validate_storage_path(path: &str) -> AppResult<()> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains("..")
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty());
    if invalid {
        return Err(AppError::InvalidStoragePath {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Build the client selected in the config
pub async fn create_storage_client(config: &Config) -> AppResult<Arc<dyn StorageClient>> {
    match config.storage_backend {
        StorageBackend::Http => {
            let client = HttpStorageClient::from_config(config)?;
            log::info!(
                "Using HTTP object storage at {} (bucket {})",
                config.storage_endpoint,
                config.storage_bucket
            );
            Ok(Arc::new(client))
        }
        StorageBackend::Local => {
            let root = config.local_storage_root()?;
            let base_url = config.public_base_url.clone().unwrap_or_else(|| {
                format!("file://{}", root.display())
            });
            let client = LocalStorageClient::new(root, base_url).await?;
            log::info!("Using local storage at {}", client.base_path().display());
            Ok(Arc::new(client))
        }
    }
}
