// Upload queue: claims pending media, pushes it to object storage and
// records the result
//
// Items move pending -> uploading -> success | error; progress_tracker owns
// the shared list and the change events, queue_store keeps it across runs.

pub mod progress_tracker;
pub mod queue_store;
pub mod retry;
pub mod upload_queue;

pub use progress_tracker::QueueEvent;
pub use queue_store::QueueStore;
pub use retry::retry_single_upload;
pub use upload_queue::{ProcessSummary, QueueSettings, UploadQueue};
