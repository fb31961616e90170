use regex::Regex;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::models::{MediaKind, MediaTarget};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v"];

const MAX_IMAGE_SIZE: u64 = 50 * 1024 * 1024;
const MAX_VIDEO_SIZE: u64 = 500 * 1024 * 1024;

const TEMP_DIR_NAME: &str = "shelter_uploader_secure";

pub struct InputValidator;

impl InputValidator {
    /// Classify a path by extension
    pub fn media_kind(path: &str) -> AppResult<MediaKind> {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .ok_or_else(|| AppError::validation("file_path", "File must have an extension"))?;

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Ok(MediaKind::Video)
        } else {
            Err(AppError::invalid_file_type(path))
        }
    }

    pub fn validate_file_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(AppError::validation("file_path", "File path cannot be empty"));
        }

        // Check for path traversal attempts
        if path.contains("..") || path.contains('~') {
            return Err(AppError::validation("file_path", "Invalid file path detected"));
        }

        Self::media_kind(path)?;

        let path_obj = Path::new(path);
        if !path_obj.exists() {
            return Err(AppError::file_not_found(path));
        }

        if !path_obj.is_file() {
            return Err(AppError::validation("file_path", "Path is not a file"));
        }

        Ok(())
    }

    /// Validates path, type and size; returns the detected kind
    pub fn validate_media_file(path: &str) -> AppResult<MediaKind> {
        Self::validate_file_path(path)?;
        let kind = Self::media_kind(path)?;

        let size = FileSystemGuard::get_file_size(path)?;
        let limit = match kind {
            MediaKind::Photo => MAX_IMAGE_SIZE,
            MediaKind::Video => MAX_VIDEO_SIZE,
        };
        if size > limit {
            return Err(AppError::file_too_large(path, size, limit));
        }
        if size == 0 {
            return Err(AppError::validation("file_path", "File is empty"));
        }

        Ok(kind)
    }

    pub fn validate_target(target: &MediaTarget) -> AppResult<()> {
        let ids = Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").unwrap();

        let required = [
            ("shelter_id", target.shelter_id.as_str()),
            ("animal_id", target.animal_id.as_str()),
            ("kennel_id", target.kennel_id.as_str()),
            ("room_id", target.room_id.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::validation(field, "Must not be empty"));
            }
            if !ids.is_match(value) {
                return Err(AppError::validation(field, "Contains invalid characters"));
            }
        }

        if let Some(walk_id) = &target.walk_id {
            if !ids.is_match(walk_id) {
                return Err(AppError::validation("walk_id", "Contains invalid characters"));
            }
        }

        Ok(())
    }

    pub fn validate_quality(quality: u8) -> AppResult<()> {
        if quality == 0 || quality > 100 {
            return Err(AppError::validation(
                "quality",
                "Quality must be between 1 and 100",
            ));
        }
        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let unsafe_chars = Regex::new(r#"[<>:"/\\|?*\x00-\x1f\s]"#).unwrap();
        let sanitized = unsafe_chars.replace_all(filename.trim(), "_");

        if sanitized.len() > 255 {
            sanitized.chars().take(255).collect()
        } else {
            sanitized.to_string()
        }
    }
}

// File system security utilities
pub struct FileSystemGuard;

impl FileSystemGuard {
    pub fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(TEMP_DIR_NAME)
    }

    pub fn create_secure_temp_file(original_path: &str) -> AppResult<PathBuf> {
        let temp_dir = Self::temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        let random_name = uuid::Uuid::new_v4().to_string();
        let extension = Path::new(original_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("tmp");

        Ok(temp_dir.join(format!("{}.{}", random_name, extension)))
    }

    /// Delete processed copies nothing refers to any more; returns how many
    pub fn cleanup_temp_files(keep: &[PathBuf]) -> AppResult<usize> {
        Self::cleanup_dir(&Self::temp_dir(), keep)
    }

    fn cleanup_dir(dir: &Path, keep: &[PathBuf]) -> AppResult<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || keep.contains(&path) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Could not remove temp file {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }

    pub fn is_temp_file(path: &Path) -> bool {
        path.starts_with(Self::temp_dir())
    }

    pub fn get_file_size(path: &str) -> AppResult<u64> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::file_not_found(path),
            _ => AppError::Io(e),
        })?;
        Ok(metadata.len())
    }
}
