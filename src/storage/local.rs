use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{validate_storage_path, StorageClient};
use crate::errors::{AppError, AppResult};

/// Filesystem storage, for offline runs and tests
#[derive(Clone)]
pub struct LocalStorageClient {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorageClient {
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> AppResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            AppError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self {
            base_path,
            base_url,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, path: &str) -> AppResult<PathBuf> {
        validate_storage_path(path)?;
        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn upload(&self, path: &str, data: Vec<u8>, _content_type: &str) -> AppResult<String> {
        let target = self.key_to_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&target, &data).await?;
        log::info!("Stored {} locally ({} bytes)", path, data.len());

        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let target = self.key_to_path(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}
