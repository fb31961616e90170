use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

const APP_DIR_NAME: &str = "Shelter Media Uploader";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Http,
    Local,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_api_key: Option<String>,
    pub local_storage_root: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub database_url: Option<String>,
    pub queue_store_path: Option<PathBuf>,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_concurrent_uploads: usize,
    pub request_timeout_secs: u64,
    pub max_image_dimension: u32,
    pub image_quality: u8,
    pub output_format: OutputFormat,
    pub auto_process: bool,
    pub auto_cleanup_days: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Local,
            storage_endpoint: String::new(),
            storage_bucket: "shelter-media".to_string(),
            storage_api_key: None,
            local_storage_root: None,
            public_base_url: None,
            database_url: None,
            queue_store_path: None,
            max_retry_attempts: 3,
            retry_delay_ms: 1000,
            max_concurrent_uploads: 0,
            request_timeout_secs: 120,
            max_image_dimension: 1920,
            image_quality: 80,
            output_format: OutputFormat::Jpeg,
            auto_process: true,
            auto_cleanup_days: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Queue store file, defaulting into the data directory
    pub fn queue_store_path(&self) -> AppResult<PathBuf> {
        match &self.queue_store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_directory()?.join("upload_queue.json")),
        }
    }

    pub fn database_url(&self) -> AppResult<String> {
        match &self.database_url {
            Some(url) => Ok(url.clone()),
            None => {
                let db_path = get_data_directory()?.join("media.db");
                Ok(format!("sqlite://{}?mode=rwc", db_path.display()))
            }
        }
    }

    pub fn local_storage_root(&self) -> AppResult<PathBuf> {
        match &self.local_storage_root {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_directory()?.join("storage")),
        }
    }
}

fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

/// Load the config from the platform config directory, creating it on first run
pub fn load_config() -> AppResult<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(config_path: &Path) -> AppResult<Config> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        });

        validate_config(&config)?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save_config_to(config_path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &Config) -> AppResult<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

pub fn get_data_directory() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Could not find data directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.max_retry_attempts == 0 || config.max_retry_attempts > 10 {
        return Err(AppError::validation(
            "max_retry_attempts",
            "Must be between 1 and 10",
        ));
    }

    if config.image_quality == 0 || config.image_quality > 100 {
        return Err(AppError::validation("image_quality", "Must be between 1 and 100"));
    }

    if config.max_image_dimension < 64 || config.max_image_dimension > 8192 {
        return Err(AppError::validation(
            "max_image_dimension",
            "Must be between 64 and 8192",
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(AppError::validation("request_timeout_secs", "Must be greater than 0"));
    }

    if config.auto_cleanup_days == 0 {
        return Err(AppError::validation("auto_cleanup_days", "Must be greater than 0"));
    }

    if config.storage_backend == StorageBackend::Http {
        if !(config.storage_endpoint.starts_with("https://")
            || config.storage_endpoint.starts_with("http://"))
        {
            return Err(AppError::validation(
                "storage_endpoint",
                "Must be an http(s) URL when the http backend is selected",
            ));
        }
        if config.storage_bucket.trim().is_empty() {
            return Err(AppError::validation("storage_bucket", "Must not be empty"));
        }
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}
