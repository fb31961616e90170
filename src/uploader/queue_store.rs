use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::errors::{AppError, AppResult};
use crate::models::{UploadItem, UploadStatus};

/// JSON file holding the queue between runs
pub struct QueueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved queue.
    ///
    /// Uploads cannot be resumed part way, so anything saved while uploading
    /// comes back as pending.
    pub fn load(&self) -> AppResult<Vec<UploadItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        let mut items: Vec<UploadItem> = match serde_json::from_str(&contents) {
            Ok(items) => items,
            Err(e) => {
                let backup_path = self.path.with_extension("json.corrupt");
                log::error!(
                    "Failed to parse queue store {}: {}. Moving it to {} and starting empty.",
                    self.path.display(),
                    e,
                    backup_path.display()
                );
                fs::rename(&self.path, &backup_path)?;
                return Ok(Vec::new());
            }
        };

        let mut recovered = 0;
        for item in items.iter_mut() {
            if item.status == UploadStatus::Uploading {
                item.status = UploadStatus::Pending;
                item.progress = 0;
                recovered += 1;
            }
            if !item.is_consistent() {
                log::warn!("Queue item {} was saved in an inconsistent state", item.id);
            }
        }

        log::info!(
            "Loaded {} queued upload(s) from {} ({} interrupted upload(s) reset)",
            items.len(),
            self.path.display(),
            recovered
        );
        Ok(items)
    }

    /// Write the queue, replacing the previous file atomically
    pub fn save(&self, items: &[UploadItem]) -> AppResult<()> {
        let _guard = self.lock()?;
        self.write_items(items)
    }

    /// Take the snapshot and write it under one lock.
    ///
    /// Concurrent savers serialise here, so a later writer always holds a
    /// snapshot at least as new as the one on disk.
    pub fn save_with<F>(&self, snapshot: F) -> AppResult<()>
    where
        F: FnOnce() -> Vec<UploadItem>,
    {
        let _guard = self.lock()?;
        self.write_items(&snapshot())
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| AppError::Internal("Queue store lock poisoned".to_string()))
    }

    fn write_items(&self, items: &[UploadItem]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(items)?;
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &self.path)?;

        log::debug!("Saved {} queue item(s) to {}", items.len(), self.path.display());
        Ok(())
    }
}
