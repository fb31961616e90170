use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::UploadItem;

use super::upload_queue::UploadQueue;

/// Retry one failed upload right away and wait for the outcome.
///
/// Unlike [`UploadQueue::retry`], this does not go through background
/// processing, so the returned item is already settled.
pub async fn retry_single_upload(queue: &UploadQueue, id: Uuid) -> AppResult<UploadItem> {
    queue.reset_failed(id)?;

    log::info!("Retrying upload {}", id);
    let status = queue.run_item(id).await?;

    let item = queue.get(id).ok_or(AppError::ItemNotFound { id })?;
    log::info!("Retry of {} finished as {}", id, status);
    Ok(item)
}
