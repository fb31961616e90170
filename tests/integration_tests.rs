use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use shelter_media_uploader::{
    database::MediaDatabase,
    errors::{AppError, AppResult},
    image_processor::{self, ProcessingOptions},
    models::{MediaKind, MediaTarget, NewUpload, UploadStatus},
    storage::{build_storage_path, LocalStorageClient, StorageClient},
    uploader::{retry_single_upload, QueueEvent, QueueSettings, QueueStore, UploadQueue},
};

/// Integration tests for the upload queue
/// Storage is faked so every outcome can be forced

enum Behavior {
    Succeed,
    FailTimes(u32),
    AlwaysFail,
    Reject,
    RateLimitOnce,
}

struct FakeStorage {
    behavior: Behavior,
    calls: AtomicU32,
}

impl FakeStorage {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn upload(&self, path: &str, _data: Vec<u8>, _content_type: &str) -> AppResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior {
            Behavior::Succeed => Ok(self.public_url(path)),
            Behavior::FailTimes(n) if call > n => Ok(self.public_url(path)),
            Behavior::FailTimes(_) | Behavior::AlwaysFail => {
                Err(AppError::upload_failed("HTTP 503: Service Unavailable"))
            }
            Behavior::Reject => Err(AppError::StorageRejected {
                path: path.to_string(),
                status: 403,
                message: "bucket policy".to_string(),
            }),
            Behavior::RateLimitOnce if call == 1 => Err(AppError::RateLimit { retry_after_ms: 0 }),
            Behavior::RateLimitOnce => Ok(self.public_url(path)),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://cdn.test/{}", path)
    }

    async fn delete(&self, _path: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Holds every upload until released
struct GatedStorage {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl StorageClient for GatedStorage {
    async fn upload(&self, path: &str, _data: Vec<u8>, _content_type: &str) -> AppResult<String> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://cdn.test/{}", path)
    }

    async fn delete(&self, _path: &str) -> AppResult<()> {
        Ok(())
    }
}

fn settings(max_attempts: u32) -> QueueSettings {
    QueueSettings {
        max_attempts,
        retry_delay: Duration::ZERO,
        max_concurrent_uploads: 0,
        auto_process: false,
    }
}

fn target() -> MediaTarget {
    MediaTarget {
        shelter_id: "shelter-1".to_string(),
        animal_id: "animal-7".to_string(),
        kennel_id: "kennel-3".to_string(),
        room_id: "room-a".to_string(),
        walk_id: None,
    }
}

/// Write a small payload and describe it as a processed photo
fn upload_in(dir: &Path, name: &str) -> NewUpload {
    let path = dir.join(name);
    std::fs::write(&path, b"not really a jpeg").unwrap();
    NewUpload {
        file_path: path,
        file_name: name.to_string(),
        content_type: "image/jpeg".to_string(),
        kind: MediaKind::Photo,
        file_size: 17,
        width: Some(4),
        height: Some(4),
        target: target(),
        is_intake: false,
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_successful_upload() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::Succeed);
    let queue = UploadQueue::new(storage.clone(), settings(3));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    assert_eq!(queue.counts().pending, 1);

    let summary = queue.process().await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert_eq!(item.progress, 100);
    assert_eq!(item.retry_count, 0);
    assert!(item.error.is_none());
    assert_eq!(
        item.uploaded_url.as_deref(),
        Some(format!("https://cdn.test/{}", build_storage_path(&item)).as_str())
    );
    assert!(item.is_consistent());
    assert_eq!(storage.calls(), 1);
}

#[tokio::test]
async fn test_always_failing_upload_uses_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::AlwaysFail);
    let queue = UploadQueue::new(storage.clone(), settings(3));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    let summary = queue.process().await;
    assert_eq!(summary.failed, 1);

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert_eq!(item.retry_count, 3);
    assert!(item.uploaded_url.is_none());
    assert!(!item.error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(storage.calls(), 3);
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::FailTimes(2));
    let queue = UploadQueue::new(storage.clone(), settings(3));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert_eq!(item.retry_count, 2);
    assert!(item.error.is_none());
    assert_eq!(storage.calls(), 3);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::RateLimitOnce);
    let queue = UploadQueue::new(storage.clone(), settings(3));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert_eq!(item.retry_count, 1);
    assert_eq!(storage.calls(), 2);
}

#[tokio::test]
async fn test_rejected_upload_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::Reject);
    let queue = UploadQueue::new(storage.clone(), settings(5));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert_eq!(item.retry_count, 1);
    assert!(item.error.as_deref().unwrap().contains("403"));
    assert_eq!(storage.calls(), 1);
}

#[tokio::test]
async fn test_missing_file_fails_without_calling_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::Succeed);
    let queue = UploadQueue::new(storage.clone(), settings(3));

    let upload = upload_in(dir.path(), "rex.jpg");
    std::fs::remove_file(&upload.file_path).unwrap();
    let ids = queue.enqueue(vec![upload]).unwrap();
    queue.process().await;

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert!(item.error.as_deref().unwrap().contains("File not found"));
    assert_eq!(storage.calls(), 0);
}

#[tokio::test]
async fn test_enqueue_rejects_invalid_target() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(FakeStorage::new(Behavior::Succeed), settings(3));

    let good = upload_in(dir.path(), "a.jpg");
    let mut bad = upload_in(dir.path(), "b.jpg");
    bad.target.animal_id = "../other".to_string();

    let result = queue.enqueue(vec![good, bad]);
    assert!(matches!(result, Err(AppError::Validation { .. })));
    assert!(queue.is_empty());

    assert!(queue.enqueue(Vec::new()).is_err());
}

#[tokio::test]
async fn test_status_changes_only_move_forward() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(FakeStorage::new(Behavior::FailTimes(1)), settings(3));
    let mut rx = queue.subscribe();

    let ids = queue
        .enqueue(vec![
            upload_in(dir.path(), "a.jpg"),
            upload_in(dir.path(), "b.jpg"),
        ])
        .unwrap();
    queue.process().await;

    let events = drain(&mut rx);
    for id in &ids {
        assert!(events.contains(&QueueEvent::Enqueued { id: *id }));

        let statuses: Vec<UploadStatus> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::StatusChanged { id: eid, status, .. } if eid == id => Some(*status),
                _ => None,
            })
            .collect();

        let rank = |s: &UploadStatus| match s {
            UploadStatus::Pending => 0,
            UploadStatus::Uploading => 1,
            UploadStatus::Success | UploadStatus::Error => 2,
        };
        assert!(statuses.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])));
        assert_eq!(statuses.first(), Some(&UploadStatus::Uploading));
        assert_eq!(statuses.last(), Some(&UploadStatus::Success));
        assert_eq!(statuses.iter().filter(|s| rank(*s) == 2).count(), 1);
    }
}

#[tokio::test]
async fn test_remove_item() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(FakeStorage::new(Behavior::Succeed), settings(3));

    let ids = queue
        .enqueue(vec![
            upload_in(dir.path(), "a.jpg"),
            upload_in(dir.path(), "b.jpg"),
            upload_in(dir.path(), "c.jpg"),
        ])
        .unwrap();

    let removed = queue.remove(ids[1]).unwrap();
    assert_eq!(removed.id, ids[1]);
    assert_eq!(queue.len(), 2);
    assert!(queue.get(ids[1]).is_none());
    assert!(queue.get(ids[0]).is_some());
    assert!(queue.get(ids[2]).is_some());

    // The source file is not ours to delete
    assert!(dir.path().join("b.jpg").exists());

    assert!(matches!(
        queue.remove(ids[1]),
        Err(AppError::ItemNotFound { .. })
    ));
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn test_remove_refused_while_uploading() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(GatedStorage {
        started: Notify::new(),
        release: Notify::new(),
    });
    let queue = UploadQueue::new(storage.clone(), settings(3));
    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();

    let worker = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.process().await })
    };
    storage.started.notified().await;

    assert_eq!(queue.get(ids[0]).unwrap().status, UploadStatus::Uploading);
    assert!(matches!(
        queue.remove(ids[0]),
        Err(AppError::ItemBusy { .. })
    ));
    assert_eq!(queue.len(), 1);

    storage.release.notify_one();
    let summary = worker.await.unwrap();
    assert_eq!(summary.succeeded, 1);

    queue.remove(ids[0]).unwrap();
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_store_reload_resets_interrupted_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("queue.json");
    let storage = Arc::new(GatedStorage {
        started: Notify::new(),
        release: Notify::new(),
    });

    let queue = UploadQueue::open(
        storage.clone(),
        settings(3),
        None,
        Some(QueueStore::new(&store_path)),
    )
    .unwrap();
    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();

    let worker = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.process().await })
    };
    storage.started.notified().await;

    // Simulates a restart while the upload is in flight
    let reopened = UploadQueue::open(
        FakeStorage::new(Behavior::Succeed),
        settings(3),
        None,
        Some(QueueStore::new(&store_path)),
    )
    .unwrap();
    let item = reopened.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Pending);
    assert_eq!(item.progress, 0);
    assert!(item.is_consistent());

    storage.release.notify_one();
    worker.await.unwrap();

    let reloaded = UploadQueue::open(
        FakeStorage::new(Behavior::Succeed),
        settings(3),
        None,
        Some(QueueStore::new(&store_path)),
    )
    .unwrap();
    assert_eq!(reloaded.get(ids[0]).unwrap().status, UploadStatus::Success);
}

#[tokio::test]
async fn test_success_writes_media_record() {
    let dir = tempfile::tempdir().unwrap();
    let database = MediaDatabase::in_memory().await.unwrap();
    let queue = UploadQueue::open(
        FakeStorage::new(Behavior::Succeed),
        settings(3),
        Some(database.clone()),
        None,
    )
    .unwrap();

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;

    let records = database
        .get_media_for_animal("shelter-1", "animal-7")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, ids[0].to_string());
    assert_eq!(
        Some(records[0].url.as_str()),
        queue.get(ids[0]).unwrap().uploaded_url.as_deref()
    );

    let stats = database.upload_stats("shelter-1").await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.successful, 1);
}

#[tokio::test]
async fn test_record_failure_is_reported_and_upload_stays_successful() {
    let dir = tempfile::tempdir().unwrap();
    let database = MediaDatabase::in_memory().await.unwrap();
    let queue = UploadQueue::open(
        FakeStorage::new(Behavior::Succeed),
        settings(3),
        Some(database.clone()),
        None,
    )
    .unwrap();
    let mut rx = queue.subscribe();

    database.pool().close().await;

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;

    assert_eq!(queue.get(ids[0]).unwrap().status, UploadStatus::Success);
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, QueueEvent::RecordFailed { id, .. } if *id == ids[0])));
}

#[tokio::test]
async fn test_retry_single_upload() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::FailTimes(2));
    let queue = UploadQueue::new(storage.clone(), settings(2));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;
    assert_eq!(queue.get(ids[0]).unwrap().status, UploadStatus::Error);

    let item = retry_single_upload(&queue, ids[0]).await.unwrap();
    assert_eq!(item.status, UploadStatus::Success);
    assert_eq!(item.retry_count, 0);
    assert_eq!(storage.calls(), 3);

    // Only errored items can be retried
    assert!(matches!(
        retry_single_upload(&queue, ids[0]).await,
        Err(AppError::ItemBusy { .. })
    ));
    assert!(matches!(
        retry_single_upload(&queue, uuid::Uuid::new_v4()).await,
        Err(AppError::ItemNotFound { .. })
    ));
}

#[tokio::test]
async fn test_retry_failed_requeues_errors() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(FakeStorage::new(Behavior::AlwaysFail), settings(1));

    queue
        .enqueue(vec![
            upload_in(dir.path(), "a.jpg"),
            upload_in(dir.path(), "b.jpg"),
        ])
        .unwrap();
    queue.process().await;
    assert_eq!(queue.counts().error, 2);

    assert_eq!(queue.retry_failed(), 2);
    let counts = queue.counts();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.error, 0);
    assert!(queue.snapshot().iter().all(|i| i.retry_count == 0 && i.is_consistent()));

    assert_eq!(queue.retry_failed(), 0);
}

#[tokio::test]
async fn test_clear_completed() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(FakeStorage::new(Behavior::Succeed), settings(3));

    queue
        .enqueue(vec![
            upload_in(dir.path(), "a.jpg"),
            upload_in(dir.path(), "b.jpg"),
        ])
        .unwrap();
    queue.process().await;

    let pending = queue.enqueue(vec![upload_in(dir.path(), "c.jpg")]).unwrap();

    assert_eq!(queue.clear_completed(), 2);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.get(pending[0]).unwrap().status, UploadStatus::Pending);
}

#[tokio::test]
async fn test_auto_process_on_enqueue() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(
        FakeStorage::new(Behavior::Succeed),
        QueueSettings {
            auto_process: true,
            ..settings(3)
        },
    );
    let mut rx = queue.subscribe();

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(QueueEvent::StatusChanged { id, status, .. })
                    if id == ids[0] && status.is_terminal() =>
                {
                    return status
                }
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("upload did not finish");

    assert_eq!(finished, UploadStatus::Success);
    assert_eq!(queue.get(ids[0]).unwrap().progress, 100);
}

#[tokio::test]
async fn test_concurrency_limit_still_uploads_everything() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FakeStorage::new(Behavior::Succeed);
    let queue = UploadQueue::new(
        storage.clone(),
        QueueSettings {
            max_concurrent_uploads: 1,
            ..settings(3)
        },
    );

    let uploads = (0..4)
        .map(|i| upload_in(dir.path(), &format!("{}.jpg", i)))
        .collect();
    queue.enqueue(uploads).unwrap();

    let summary = queue.process().await;
    assert_eq!(summary.succeeded, 4);
    assert_eq!(storage.calls(), 4);
    assert_eq!(queue.counts().success, 4);
}

#[tokio::test]
async fn test_photo_to_local_storage_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Rex at intake.png");
    image::RgbImage::from_pixel(64, 32, image::Rgb([200, 120, 40]))
        .save(&source)
        .unwrap();

    let storage_root = dir.path().join("bucket");
    let storage = Arc::new(
        LocalStorageClient::new(&storage_root, "https://media.test".to_string())
            .await
            .unwrap(),
    );
    let queue = UploadQueue::new(storage, settings(3));

    let options = ProcessingOptions {
        max_dimension: 16,
        ..ProcessingOptions::default()
    };
    let upload = image_processor::prepare_media(&source.to_string_lossy(), target(), true, options)
        .await
        .unwrap();
    assert_eq!(upload.width, Some(16));
    assert_eq!(upload.height, Some(8));
    assert_eq!(upload.file_name, "Rex_at_intake.jpg");
    let processed_path = upload.file_path.clone();

    let ids = queue.enqueue(vec![upload]).unwrap();
    queue.process().await;

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Success);

    let key = build_storage_path(&item);
    assert!(key.starts_with("shelter-1/animals/animal-7/intake/photos/"));
    assert!(storage_root.join(&key).exists());
    assert_eq!(
        item.uploaded_url.as_deref(),
        Some(format!("https://media.test/{}", key).as_str())
    );

    // Processed copies are cleaned up once stored
    assert!(!processed_path.exists());
    assert!(source.exists());
}

#[tokio::test]
async fn test_retry_puts_errored_item_back_in_line() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(FakeStorage::new(Behavior::AlwaysFail), settings(1));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    queue.process().await;
    assert_eq!(queue.get(ids[0]).unwrap().status, UploadStatus::Error);

    queue.retry(ids[0]).unwrap();
    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Pending);
    assert!(item.error.is_none());

    assert!(matches!(
        queue.retry(ids[0]),
        Err(AppError::ItemBusy { .. })
    ));
}

/// Panics mid-upload
struct PanickingStorage;

#[async_trait]
impl StorageClient for PanickingStorage {
    async fn upload(&self, _path: &str, _data: Vec<u8>, _content_type: &str) -> AppResult<String> {
        panic!("storage backend blew up");
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://cdn.test/{}", path)
    }

    async fn delete(&self, _path: &str) -> AppResult<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_store_matches_memory_after_concurrent_uploads() {
    for round in 0..10 {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("queue.json");
        let queue = UploadQueue::open(
            FakeStorage::new(Behavior::Succeed),
            settings(3),
            None,
            Some(QueueStore::new(&store_path)),
        )
        .unwrap();

        let uploads = (0..40)
            .map(|i| upload_in(dir.path(), &format!("{}.jpg", i)))
            .collect();
        queue.enqueue(uploads).unwrap();
        let summary = queue.process().await;
        assert_eq!(summary.succeeded, 40);

        let saved = QueueStore::new(&store_path).load().unwrap();
        let saved_success = saved
            .iter()
            .filter(|i| i.status == UploadStatus::Success)
            .count();
        assert_eq!(saved_success, 40, "round {} saved a stale queue", round);
    }
}

#[tokio::test]
async fn test_items_waiting_for_a_slot_stay_pending_and_removable() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(GatedStorage {
        started: Notify::new(),
        release: Notify::new(),
    });
    let queue = UploadQueue::new(
        storage.clone(),
        QueueSettings {
            max_concurrent_uploads: 1,
            ..settings(3)
        },
    );
    queue
        .enqueue(vec![
            upload_in(dir.path(), "a.jpg"),
            upload_in(dir.path(), "b.jpg"),
        ])
        .unwrap();

    let worker = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.process().await })
    };
    storage.started.notified().await;

    let counts = queue.counts();
    assert_eq!(counts.uploading, 1);
    assert_eq!(counts.pending, 1);

    let waiting = queue
        .snapshot()
        .into_iter()
        .find(|i| i.status == UploadStatus::Pending)
        .unwrap();
    queue.remove(waiting.id).unwrap();
    assert_eq!(queue.len(), 1);

    storage.release.notify_one();
    let summary = worker.await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(queue.counts().success, 1);
}

#[tokio::test]
async fn test_panicking_upload_settles_into_error() {
    let dir = tempfile::tempdir().unwrap();
    let queue = UploadQueue::new(Arc::new(PanickingStorage), settings(3));

    let ids = queue.enqueue(vec![upload_in(dir.path(), "rex.jpg")]).unwrap();
    let summary = queue.process().await;
    assert_eq!(summary.failed, 1);

    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Error);
    assert!(item.error.as_deref().unwrap().contains("Upload task failed"));
    assert!(item.is_consistent());

    // Settled items can be removed again
    queue.remove(ids[0]).unwrap();
}

#[tokio::test]
async fn test_duplicate_content_is_detected_per_shelter() {
    let dir = tempfile::tempdir().unwrap();
    let database = MediaDatabase::in_memory().await.unwrap();
    let queue = UploadQueue::open(
        FakeStorage::new(Behavior::Succeed),
        settings(3),
        Some(database),
        None,
    )
    .unwrap();

    let first = upload_in(dir.path(), "rex.jpg");
    assert!(!queue.is_duplicate(&first).await.unwrap());
    queue.enqueue(vec![first]).unwrap();
    queue.process().await;

    let again = upload_in(dir.path(), "rex-copy.jpg");
    assert!(queue.is_duplicate(&again).await.unwrap());

    let mut other_shelter = upload_in(dir.path(), "rex-elsewhere.jpg");
    other_shelter.target.shelter_id = "shelter-2".to_string();
    assert!(!queue.is_duplicate(&other_shelter).await.unwrap());

    // Without a database nothing counts as a duplicate
    let plain = UploadQueue::new(FakeStorage::new(Behavior::Succeed), settings(3));
    assert!(!plain.is_duplicate(&again).await.unwrap());
}
