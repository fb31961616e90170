use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::config::Config;
use crate::database::MediaDatabase;
use crate::errors::{AppError, AppResult};
use crate::image_processor;
use crate::models::{NewUpload, QueueCounts, UploadItem, UploadStatus};
use crate::security::{FileSystemGuard, InputValidator};
use crate::storage::{build_storage_path, StorageClient};

use super::progress_tracker::{ProgressTracker, QueueEvent};
use super::queue_store::QueueStore;

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// Total attempts per item before it settles into error
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// 0 means no limit
    pub max_concurrent_uploads: usize,
    pub auto_process: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            max_concurrent_uploads: 0,
            auto_process: true,
        }
    }
}

impl From<&Config> for QueueSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_concurrent_uploads: config.max_concurrent_uploads,
            auto_process: config.auto_process,
        }
    }
}

/// Outcome of one `process` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub succeeded: usize,
    pub failed: usize,
}

struct QueueInner {
    tracker: ProgressTracker,
    storage: Arc<dyn StorageClient>,
    database: Option<MediaDatabase>,
    store: Option<QueueStore>,
    settings: QueueSettings,
    limiter: Option<Arc<Semaphore>>,
}

/// Photo and video upload queue.
///
/// Items go `pending -> uploading -> success | error`. Every mutation is
/// published to subscribers and, when a store is attached, written to disk.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    /// In-memory queue without persistence or media records
    pub fn new(storage: Arc<dyn StorageClient>, settings: QueueSettings) -> Self {
        Self::build(Vec::new(), storage, settings, None, None)
    }

    /// Queue backed by a store, reloading whatever it holds
    pub fn open(
        storage: Arc<dyn StorageClient>,
        settings: QueueSettings,
        database: Option<MediaDatabase>,
        store: Option<QueueStore>,
    ) -> AppResult<Self> {
        let items = match &store {
            Some(store) => store.load()?,
            None => Vec::new(),
        };
        Ok(Self::build(items, storage, settings, database, store))
    }

    fn build(
        items: Vec<UploadItem>,
        storage: Arc<dyn StorageClient>,
        settings: QueueSettings,
        database: Option<MediaDatabase>,
        store: Option<QueueStore>,
    ) -> Self {
        let limiter = match settings.max_concurrent_uploads {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Self {
            inner: Arc::new(QueueInner {
                tracker: ProgressTracker::new(items),
                storage,
                database,
                store,
                settings,
                limiter,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.tracker.subscribe()
    }

    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.inner.tracker.snapshot()
    }

    pub fn get(&self, id: Uuid) -> Option<UploadItem> {
        self.inner.tracker.get(id)
    }

    pub fn len(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> QueueCounts {
        self.inner.tracker.counts()
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.inner.settings
    }

    /// Add processed files as pending items and start processing.
    ///
    /// Nothing is queued if any upload fails validation.
    pub fn enqueue(&self, uploads: Vec<NewUpload>) -> AppResult<Vec<Uuid>> {
        if uploads.is_empty() {
            return Err(AppError::validation("uploads", "No files provided"));
        }
        for upload in &uploads {
            InputValidator::validate_target(&upload.target)?;
        }

        let items: Vec<UploadItem> = uploads.into_iter().map(UploadItem::from_new).collect();
        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();

        log::info!("Queued {} upload(s)", items.len());
        self.inner.tracker.append(items)?;
        self.persist();

        if self.inner.settings.auto_process {
            self.spawn_processing();
        }
        Ok(ids)
    }

    fn spawn_processing(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = self.clone();
                handle.spawn(async move {
                    queue.process().await;
                });
            }
            Err(_) => log::warn!("No async runtime; queued uploads wait for an explicit process()"),
        }
    }

    /// Upload every pending item concurrently and wait for them to settle
    pub async fn process(&self) -> ProcessSummary {
        let pending = self.inner.tracker.pending_ids();
        if pending.is_empty() {
            return ProcessSummary::default();
        }

        log::info!("Processing {} upload(s)", pending.len());

        // Each upload runs in its own task so a panic surfaces here as a
        // JoinError that still carries the item id.
        let mut tasks = JoinSet::new();
        for id in pending {
            let worker = self.clone();
            tasks.spawn(async move {
                let result = tokio::spawn(async move { worker.run_item(id).await }).await;
                (id, result)
            });
        }

        let mut summary = ProcessSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(UploadStatus::Success)))) => summary.succeeded += 1,
                Ok((_, Ok(Ok(_)))) => summary.failed += 1,
                Ok((id, Ok(Err(e)))) => {
                    log::debug!("Skipped upload {}: {}", id, e);
                }
                Ok((id, Err(e))) => {
                    log::error!("Upload task for {} panicked or was cancelled: {}", id, e);
                    self.inner
                        .tracker
                        .update_progress_interrupted(id, format!("Upload task failed: {}", e));
                    self.persist_async().await;
                    summary.failed += 1;
                }
                Err(e) => {
                    log::error!("Upload supervisor task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Processing finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        summary
    }

    /// Wait for an upload slot, claim the item and drive it to success or error.
    ///
    /// Items stay pending (and removable) while they wait for a slot.
    pub(crate) async fn run_item(&self, id: Uuid) -> AppResult<UploadStatus> {
        let _permit = match &self.inner.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let item = self.inner.tracker.claim(id)?;
        self.persist_async().await;

        Ok(self.upload_claimed(item).await)
    }

    async fn upload_claimed(&self, item: UploadItem) -> UploadStatus {
        let storage_path = build_storage_path(&item);
        let max_attempts = self.inner.settings.max_attempts;

        loop {
            match self.upload_once(&item, &storage_path).await {
                Ok(url) => {
                    let stored = self.inner.tracker.update_progress_success(item.id, url);
                    self.persist_async().await;
                    if let Some(stored) = stored {
                        self.finish_success(&stored, &storage_path).await;
                    }
                    return UploadStatus::Success;
                }
                Err(e) => {
                    let attempts = self
                        .inner
                        .tracker
                        .update_progress_attempt_failed(item.id, &e)
                        .unwrap_or(max_attempts);

                    if e.is_permanent() || attempts >= max_attempts {
                        let failed = self
                            .inner
                            .tracker
                            .update_progress_failure(item.id, e.to_string());
                        self.persist_async().await;
                        if let Some(failed) = failed {
                            self.record_history(&failed).await;
                        }
                        return UploadStatus::Error;
                    }

                    self.persist_async().await;
                    let delay = match e {
                        AppError::RateLimit { retry_after_ms } => {
                            Duration::from_millis(retry_after_ms).max(self.inner.settings.retry_delay)
                        }
                        _ => self.inner.settings.retry_delay,
                    };
                    log::info!(
                        "Retrying {} in {:?} (attempt {} of {})",
                        item.file_name,
                        delay,
                        attempts + 1,
                        max_attempts
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn upload_once(&self, item: &UploadItem, storage_path: &str) -> AppResult<String> {
        let data = tokio::fs::read(&item.file_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::file_not_found(&item.file_path.to_string_lossy())
            }
            _ => AppError::Io(e),
        })?;

        self.inner.tracker.update_progress_percent(item.id, 10);

        self.inner
            .storage
            .upload(storage_path, data, &item.content_type)
            .await
    }

    /// Write the media record; a failure here leaves the item successful
    async fn finish_success(&self, item: &UploadItem, storage_path: &str) {
        if let Some(database) = &self.inner.database {
            if let Err(e) = database.record_media(item, storage_path).await {
                log::error!(
                    "Stored {} at {} but failed to record it: {}",
                    item.file_name,
                    storage_path,
                    e
                );
                self.inner.tracker.emit(QueueEvent::RecordFailed {
                    id: item.id,
                    error: e.to_string(),
                });
            }
        }

        self.record_history(item).await;
        cleanup_temp_file(&item.file_path).await;
    }

    async fn record_history(&self, item: &UploadItem) {
        let Some(database) = &self.inner.database else {
            return;
        };

        let file_hash = image_processor::get_file_hash(&item.file_path.to_string_lossy())
            .await
            .ok();
        if let Err(e) = database.record_upload(item, file_hash).await {
            log::warn!("Failed to record upload history for {}: {}", item.id, e);
        }
    }

    /// Remove an item; refused while it is uploading
    pub fn remove(&self, id: Uuid) -> AppResult<UploadItem> {
        let removed = self.inner.tracker.remove(id)?;
        self.persist();

        if removed.status != UploadStatus::Success {
            let path = removed.file_path.clone();
            if FileSystemGuard::is_temp_file(&path) {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::debug!("Temp file {} already gone: {}", path.display(), e);
                }
            }
        }

        log::info!("Removed upload {} ({})", id, removed.file_name);
        Ok(removed)
    }

    /// Put an errored item back in line
    pub fn retry(&self, id: Uuid) -> AppResult<()> {
        self.reset_failed(id)?;
        if self.inner.settings.auto_process {
            self.spawn_processing();
        }
        Ok(())
    }

    /// Put every errored item back in line; returns how many
    pub fn retry_failed(&self) -> usize {
        let mut count = 0;
        for id in self.inner.tracker.failed_ids() {
            if self.inner.tracker.reset_failed(id).is_ok() {
                count += 1;
            }
        }

        if count > 0 {
            self.persist();
            if self.inner.settings.auto_process {
                self.spawn_processing();
            }
        }
        count
    }

    pub(crate) fn reset_failed(&self, id: Uuid) -> AppResult<()> {
        self.inner.tracker.reset_failed(id)?;
        self.persist();
        Ok(())
    }

    /// Whether identical content was already stored for the item's shelter.
    ///
    /// Always false without a media database.
    pub async fn is_duplicate(&self, upload: &NewUpload) -> AppResult<bool> {
        let Some(database) = &self.inner.database else {
            return Ok(false);
        };

        let file_hash = image_processor::get_file_hash(&upload.file_path.to_string_lossy()).await?;
        database
            .has_uploaded_hash(&upload.target.shelter_id, &file_hash)
            .await
    }

    /// Acknowledge and drop every successful item
    pub fn clear_completed(&self) -> usize {
        let removed = self.inner.tracker.remove_completed();
        if !removed.is_empty() {
            self.persist();
        }
        removed.len()
    }

    fn persist(&self) {
        if let Some(store) = &self.inner.store {
            let tracker = &self.inner.tracker;
            if let Err(e) = store.save_with(|| tracker.snapshot()) {
                log::error!("Failed to save upload queue (non-critical): {}", e);
            }
        }
    }

    /// `persist` off the async worker threads
    async fn persist_async(&self) {
        if self.inner.store.is_none() {
            return;
        }
        let queue = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || queue.persist()).await {
            log::error!("Queue save task failed (non-critical): {}", e);
        }
    }
}

async fn cleanup_temp_file(path: &Path) {
    if FileSystemGuard::is_temp_file(path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            log::debug!("Could not remove temp file {}: {}", path.display(), e);
        }
    }
}
