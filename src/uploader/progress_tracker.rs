use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{QueueCounts, UploadItem, UploadStatus};

const EVENT_CAPACITY: usize = 256;

/// Change notifications for the UI badge and status list
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum QueueEvent {
    Enqueued {
        id: Uuid,
    },
    StatusChanged {
        id: Uuid,
        status: UploadStatus,
        progress: u8,
        retry_count: u32,
    },
    Removed {
        id: Uuid,
    },
    /// Stored fine, but the media record could not be written
    RecordFailed {
        id: Uuid,
        error: String,
    },
}

/// Shared queue list plus the event channel every mutation reports to
#[derive(Clone)]
pub struct ProgressTracker {
    items: Arc<Mutex<Vec<UploadItem>>>,
    events: broadcast::Sender<QueueEvent>,
}

impl ProgressTracker {
    pub fn new(items: Vec<UploadItem>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: Arc::new(Mutex::new(items)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: QueueEvent) {
        // No subscribers is not an error
        if self.events.send(event.clone()).is_err() {
            log::trace!("No queue subscribers for {:?}", event);
        }
    }

    fn emit_status(&self, item: &UploadItem) {
        self.emit(QueueEvent::StatusChanged {
            id: item.id,
            status: item.status,
            progress: item.progress,
            retry_count: item.retry_count,
        });
    }

    /// Run `f` with the locked list; `None` if the lock is poisoned
    fn with_items<F, R>(&self, operation: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Vec<UploadItem>) -> R,
    {
        match self.items.lock() {
            Ok(mut items) => Some(f(&mut items)),
            Err(e) => {
                log::error!(
                    "Failed to acquire queue lock for {} (non-critical): {}",
                    operation,
                    e
                );
                None
            }
        }
    }

    /// Update one item in place, emitting its new status
    fn update_item<F, R>(&self, id: Uuid, operation: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut UploadItem) -> R,
    {
        let updated = self.with_items(operation, |items| {
            items
                .iter_mut()
                .find(|item| item.id == id)
                .map(|item| {
                    let result = f(item);
                    (result, item.clone())
                })
        })?;

        match updated {
            Some((result, item)) => {
                self.emit_status(&item);
                Some(result)
            }
            None => {
                log::warn!("Upload item {} not found for {} operation", id, operation);
                None
            }
        }
    }

    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.with_items("snapshot", |items| items.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, id: Uuid) -> Option<UploadItem> {
        self.with_items("read", |items| items.iter().find(|i| i.id == id).cloned())
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.with_items("len", |items| items.len()).unwrap_or(0)
    }

    pub fn counts(&self) -> QueueCounts {
        self.with_items("counts", |items| {
            let mut counts = QueueCounts::default();
            for item in items.iter() {
                match item.status {
                    UploadStatus::Pending => counts.pending += 1,
                    UploadStatus::Uploading => counts.uploading += 1,
                    UploadStatus::Success => counts.success += 1,
                    UploadStatus::Error => counts.error += 1,
                }
            }
            counts
        })
        .unwrap_or_default()
    }

    pub fn append(&self, new_items: Vec<UploadItem>) -> AppResult<()> {
        let ids: Vec<Uuid> = new_items.iter().map(|i| i.id).collect();
        self.with_items("enqueue", |items| items.extend(new_items))
            .ok_or_else(|| AppError::Internal("Upload queue lock poisoned".to_string()))?;

        for id in ids {
            self.emit(QueueEvent::Enqueued { id });
        }
        Ok(())
    }

    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.with_items("pending ids", |items| {
            items
                .iter()
                .filter(|i| i.status == UploadStatus::Pending)
                .map(|i| i.id)
                .collect()
        })
        .unwrap_or_default()
    }

    /// Move one pending item to uploading and hand it out.
    ///
    /// Claiming happens under the lock, so an item is only ever handed to one
    /// processor.
    pub fn claim(&self, id: Uuid) -> AppResult<UploadItem> {
        let claimed = self
            .with_items("claim", |items| {
                let item = items
                    .iter_mut()
                    .find(|item| item.id == id)
                    .ok_or(AppError::ItemNotFound { id })?;
                if item.status != UploadStatus::Pending {
                    return Err(AppError::item_busy(id, item.status.as_str(), "claimed"));
                }
                item.mark_uploading();
                Ok(item.clone())
            })
            .ok_or_else(|| AppError::Internal("Upload queue lock poisoned".to_string()))??;

        self.emit_status(&claimed);
        Ok(claimed)
    }

    pub fn update_progress_percent(&self, id: Uuid, percent: u8) {
        self.update_item(id, "progress update", |item| {
            if item.status == UploadStatus::Uploading {
                item.progress = percent.min(99);
            }
        });
    }

    /// Count a failed attempt; returns the new retry count
    pub fn update_progress_attempt_failed(&self, id: Uuid, error: &AppError) -> Option<u32> {
        self.update_item(id, "attempt failure", |item| {
            item.retry_count += 1;
            log::warn!(
                "Upload attempt {} for {} failed: {}",
                item.retry_count,
                item.file_name,
                error
            );
            item.retry_count
        })
    }

    pub fn update_progress_success(&self, id: Uuid, url: String) -> Option<UploadItem> {
        self.update_item(id, "success update", |item| {
            item.mark_success(url);
            log::info!(
                "Uploaded {} after {} failed attempt(s) -> {}",
                item.file_name,
                item.retry_count,
                item.uploaded_url.as_deref().unwrap_or_default()
            );
            item.clone()
        })
    }

    pub fn update_progress_failure(&self, id: Uuid, error: String) -> Option<UploadItem> {
        self.update_item(id, "failure update", |item| {
            item.mark_error(error);
            log::error!(
                "Giving up on {} after {} attempt(s): {}",
                item.file_name,
                item.retry_count,
                item.error.as_deref().unwrap_or_default()
            );
            item.clone()
        })
    }

    /// Settle an item whose upload task died mid-flight
    pub fn update_progress_interrupted(&self, id: Uuid, error: String) -> Option<UploadItem> {
        self.with_items("interrupted update", |items| {
            let item = items
                .iter_mut()
                .find(|item| item.id == id && item.status == UploadStatus::Uploading)?;
            item.mark_error(error);
            Some(item.clone())
        })
        .flatten()
        .map(|item| {
            log::error!(
                "Upload of {} was interrupted: {}",
                item.file_name,
                item.error.as_deref().unwrap_or_default()
            );
            self.emit_status(&item);
            item
        })
    }

    /// Error back to pending for a manual retry
    pub fn reset_failed(&self, id: Uuid) -> AppResult<()> {
        let reset = self
            .with_items("reset failed", |items| {
                let item = items
                    .iter_mut()
                    .find(|item| item.id == id)
                    .ok_or(AppError::ItemNotFound { id })?;
                if item.status != UploadStatus::Error {
                    return Err(AppError::item_busy(id, item.status.as_str(), "retried"));
                }
                item.reset_to_pending();
                Ok(item.clone())
            })
            .ok_or_else(|| AppError::Internal("Upload queue lock poisoned".to_string()))??;

        self.emit_status(&reset);
        Ok(())
    }

    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.with_items("failed ids", |items| {
            items
                .iter()
                .filter(|i| i.status == UploadStatus::Error)
                .map(|i| i.id)
                .collect()
        })
        .unwrap_or_default()
    }

    /// Remove an item unless it is mid-upload
    pub fn remove(&self, id: Uuid) -> AppResult<UploadItem> {
        let removed = self
            .with_items("remove", |items| {
                let index = items
                    .iter()
                    .position(|item| item.id == id)
                    .ok_or(AppError::ItemNotFound { id })?;
                if items[index].status == UploadStatus::Uploading {
                    return Err(AppError::item_busy(id, "uploading", "removed"));
                }
                Ok(items.remove(index))
            })
            .ok_or_else(|| AppError::Internal("Upload queue lock poisoned".to_string()))??;

        self.emit(QueueEvent::Removed { id });
        Ok(removed)
    }

    pub fn remove_completed(&self) -> Vec<UploadItem> {
        let removed = self
            .with_items("clear completed", |items| {
                let (done, keep): (Vec<_>, Vec<_>) = items
                    .drain(..)
                    .partition(|item| item.status == UploadStatus::Success);
                *items = keep;
                done
            })
            .unwrap_or_default();

        for item in &removed {
            self.emit(QueueEvent::Removed { id: item.id });
        }
        removed
    }
}
