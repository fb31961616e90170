use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use shelter_media_uploader::config::{self, Config};
use shelter_media_uploader::database::MediaDatabase;
use shelter_media_uploader::image_processor::{self, ProcessingOptions};
use shelter_media_uploader::models::{MediaTarget, UploadItem};
use shelter_media_uploader::security::FileSystemGuard;
use shelter_media_uploader::storage;
use shelter_media_uploader::uploader::{self, QueueSettings, QueueStore, UploadQueue};

#[derive(Parser)]
#[command(name = "shelter-uploader", about = "Queue and upload shelter photos and videos")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process files, queue them for an animal and upload them
    Upload {
        #[arg(long)]
        shelter: String,
        #[arg(long)]
        animal: String,
        #[arg(long)]
        kennel: String,
        #[arg(long)]
        room: String,
        /// Walk session the media belongs to
        #[arg(long)]
        walk: Option<String>,
        /// Media captured on the intake form
        #[arg(long)]
        intake: bool,
        /// Upload even if identical content was already stored for the shelter
        #[arg(long)]
        force: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the queue
    Status,
    /// Retry one failed upload, or all of them
    Retry { id: Option<Uuid> },
    /// Remove an item that is not uploading
    Remove { id: Uuid },
    /// Drop successful uploads from the queue
    Clear,
    /// List stored media for an animal
    Media {
        #[arg(long)]
        shelter: String,
        #[arg(long)]
        animal: String,
    },
    /// Delete old upload history and unreferenced processed files
    Cleanup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("Failed to load configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    log::info!("Starting shelter media uploader");

    let database = MediaDatabase::connect(&config.database_url()?)
        .await
        .context("Failed to open media database")?;

    match cli.command {
        Commands::Upload {
            shelter,
            animal,
            kennel,
            room,
            walk,
            intake,
            force,
            files,
        } => {
            let target = MediaTarget {
                shelter_id: shelter,
                animal_id: animal,
                kennel_id: kennel,
                room_id: room,
                walk_id: walk,
            };
            let queue = open_queue(&config, database).await?;
            let options = ProcessingOptions::from(&config);

            let mut uploads = Vec::new();
            for file in &files {
                let path = file.to_string_lossy();
                let upload =
                    match image_processor::prepare_media(&path, target.clone(), intake, options).await {
                        Ok(upload) => upload,
                        Err(e) => {
                            log::error!("Skipping {}: {}", path, e);
                            continue;
                        }
                    };

                if !force && queue.is_duplicate(&upload).await.unwrap_or(false) {
                    log::warn!("Skipping {}: already uploaded for {}", path, target.shelter_id);
                    if FileSystemGuard::is_temp_file(&upload.file_path) {
                        let _ = std::fs::remove_file(&upload.file_path);
                    }
                    continue;
                }
                uploads.push(upload);
            }
            if uploads.is_empty() {
                anyhow::bail!("None of the given files could be prepared for upload");
            }

            queue.enqueue(uploads)?;
            let summary = queue.process().await;
            println!(
                "Uploaded {} file(s), {} failed",
                summary.succeeded, summary.failed
            );
            print_items(&queue.snapshot());
        }
        Commands::Status => {
            let queue = open_queue(&config, database).await?;
            let counts = queue.counts();
            println!(
                "{} item(s): {} pending, {} uploading, {} done, {} failed",
                counts.total(),
                counts.pending,
                counts.uploading,
                counts.success,
                counts.error
            );
            print_items(&queue.snapshot());
        }
        Commands::Retry { id: Some(id) } => {
            let queue = open_queue(&config, database).await?;
            let item = uploader::retry_single_upload(&queue, id).await?;
            print_items(&[item]);
        }
        Commands::Retry { id: None } => {
            let queue = open_queue(&config, database).await?;
            let count = queue.retry_failed();
            let summary = queue.process().await;
            println!(
                "Retried {} item(s): {} succeeded, {} failed",
                count, summary.succeeded, summary.failed
            );
        }
        Commands::Remove { id } => {
            let queue = open_queue(&config, database).await?;
            let removed = queue.remove(id)?;
            println!("Removed {} ({})", removed.id, removed.file_name);
        }
        Commands::Clear => {
            let queue = open_queue(&config, database).await?;
            println!("Cleared {} completed upload(s)", queue.clear_completed());
        }
        Commands::Media { shelter, animal } => {
            for record in database.get_media_for_animal(&shelter, &animal).await? {
                println!(
                    "{}  {:<5}  {}  {}",
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.kind,
                    record.file_name,
                    record.url
                );
            }
        }
        Commands::Cleanup => {
            let removed = database
                .cleanup_old_upload_history(config.auto_cleanup_days)
                .await?;
            println!("Removed {} history entr(ies)", removed);

            // Queued items still need their processed copies
            let queue = open_queue(&config, database).await?;
            let keep: Vec<PathBuf> = queue.snapshot().into_iter().map(|i| i.file_path).collect();
            let deleted = FileSystemGuard::cleanup_temp_files(&keep)?;
            println!("Removed {} unreferenced temp file(s)", deleted);
        }
    }

    Ok(())
}

/// The CLI drives processing itself, so background processing is off
async fn open_queue(config: &Config, database: MediaDatabase) -> anyhow::Result<UploadQueue> {
    let storage = storage::create_storage_client(config).await?;
    let settings = QueueSettings {
        auto_process: false,
        ..QueueSettings::from(config)
    };
    let store = QueueStore::new(config.queue_store_path()?);

    let queue = UploadQueue::open(storage, settings, Some(database), Some(store))
        .context("Failed to open upload queue")?;
    Ok(queue)
}

fn print_items(items: &[UploadItem]) {
    for item in items {
        let detail = item
            .uploaded_url
            .as_deref()
            .or(item.error.as_deref())
            .unwrap_or("");
        println!(
            "{}  {:<9} {:>3}%  retries={}  {}  {}",
            item.id, item.status, item.progress, item.retry_count, item.file_name, detail
        );
    }
}
