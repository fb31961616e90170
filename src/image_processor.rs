use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::{Config, OutputFormat};
use crate::errors::{AppError, AppResult};
use crate::models::{MediaKind, MediaTarget, NewUpload};
use crate::security::{FileSystemGuard, InputValidator};

/// Files above this size are always recompressed
const RECOMPRESS_THRESHOLD: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ProcessingOptions {
    pub max_dimension: u32,
    pub quality: u8,
    pub format: OutputFormat,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            quality: 80,
            format: OutputFormat::Jpeg,
        }
    }
}

impl From<&Config> for ProcessingOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_dimension: config.max_image_dimension,
            quality: config.image_quality,
            format: config.output_format,
        }
    }
}

/// A file on disk that is ready to upload
#[derive(Debug, Clone)]
pub struct ProcessedMedia {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ProcessedMedia {
    pub fn into_upload(self, target: MediaTarget, is_intake: bool) -> NewUpload {
        NewUpload {
            file_path: self.path,
            file_name: self.file_name,
            content_type: self.content_type,
            kind: self.kind,
            file_size: self.file_size,
            width: self.width,
            height: self.height,
            target,
            is_intake,
        }
    }
}

/// Dimensions that fit inside `max_dimension` on both sides, never upscaling
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let ratio = f64::min(
        max_dimension as f64 / width as f64,
        max_dimension as f64 / height as f64,
    );
    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_dimension);
    (new_width, new_height)
}

/// Resize and recompress an image into a temp file
pub fn process_image(file_path: &str, options: &ProcessingOptions) -> AppResult<ProcessedMedia> {
    let kind = InputValidator::validate_media_file(file_path)?;
    if kind != MediaKind::Photo {
        return Err(AppError::invalid_file_type(file_path));
    }
    InputValidator::validate_quality(options.quality)?;
    if options.max_dimension == 0 {
        return Err(AppError::validation(
            "max_dimension",
            "Must be at least 1 pixel",
        ));
    }

    let img = image::open(file_path)?;
    let (orig_width, orig_height) = img.dimensions();
    let (width, height) = bounded_dimensions(orig_width, orig_height, options.max_dimension);

    let img = if (width, height) != (orig_width, orig_height) {
        log::info!(
            "Resizing {} from {}x{} to {}x{}",
            file_path,
            orig_width,
            orig_height,
            width,
            height
        );
        img.resize_exact(width, height, FilterType::Lanczos3)
    } else {
        img
    };

    let encoded = encode_image(&img, options)?;

    let temp_path = FileSystemGuard::create_secure_temp_file(file_path)?;
    let output_path = temp_path.with_extension(options.format.extension());
    fs::write(&output_path, &encoded)?;

    let original_size = FileSystemGuard::get_file_size(file_path)?;
    log::info!(
        "Processed {} -> {} ({} KB -> {} KB, quality {})",
        file_path,
        output_path.display(),
        original_size / 1024,
        encoded.len() / 1024,
        options.quality
    );

    Ok(ProcessedMedia {
        path: output_path,
        file_name: output_file_name(file_path, options.format),
        content_type: options.format.content_type().to_string(),
        kind: MediaKind::Photo,
        file_size: encoded.len() as u64,
        width: Some(img.width()),
        height: Some(img.height()),
    })
}

fn encode_image(img: &DynamicImage, options: &ProcessingOptions) -> AppResult<Vec<u8>> {
    match options.format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let mut output = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut output, options.quality);
            rgb.write_with_encoder(encoder)?;
            Ok(output)
        }
        OutputFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = webp::Encoder::from_image(&rgba)
                .map_err(|e| AppError::Encoding(e.to_string()))?;
            Ok(encoder.encode(options.quality as f32).to_vec())
        }
    }
}

fn output_file_name(file_path: &str, format: OutputFormat) -> String {
    let stem = Path::new(file_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    format!(
        "{}.{}",
        InputValidator::sanitize_filename(&stem),
        format.extension()
    )
}

/// Videos are uploaded as-is once they pass validation
pub fn prepare_video(file_path: &str) -> AppResult<ProcessedMedia> {
    let kind = InputValidator::validate_media_file(file_path)?;
    if kind != MediaKind::Video {
        return Err(AppError::invalid_file_type(file_path));
    }

    let path = Path::new(file_path);
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let content_type = match ext.as_str() {
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "m4v" => "video/x-m4v",
        _ => "video/mp4",
    };

    let file_name = path
        .file_name()
        .map(|n| InputValidator::sanitize_filename(&n.to_string_lossy()))
        .unwrap_or_else(|| format!("video.{}", ext));

    Ok(ProcessedMedia {
        path: path.to_path_buf(),
        file_name,
        content_type: content_type.to_string(),
        kind: MediaKind::Video,
        file_size: FileSystemGuard::get_file_size(file_path)?,
        width: None,
        height: None,
    })
}

/// Process any supported file into an upload for the given records
pub async fn prepare_media(
    file_path: &str,
    target: MediaTarget,
    is_intake: bool,
    options: ProcessingOptions,
) -> AppResult<NewUpload> {
    InputValidator::validate_target(&target)?;

    let path = file_path.to_string();
    let processed = match InputValidator::media_kind(file_path)? {
        MediaKind::Photo => tokio::task::spawn_blocking(move || process_image(&path, &options))
            .await
            .map_err(|e| AppError::Internal(format!("Image processing task failed: {}", e)))??,
        MediaKind::Video => prepare_video(&path)?,
    };

    Ok(processed.into_upload(target, is_intake))
}

/// Get image dimensions and file size
pub fn get_image_info(file_path: &str) -> AppResult<(u32, u32, u64)> {
    InputValidator::validate_media_file(file_path)?;

    let file_size = FileSystemGuard::get_file_size(file_path)?;

    // Read only the image header for dimensions
    let dimensions = image::ImageReader::open(file_path)?
        .with_guessed_format()?
        .into_dimensions()?;

    Ok((dimensions.0, dimensions.1, file_size))
}

/// Whether an image is over the size or dimension bound
pub fn should_process_image(file_path: &str, options: &ProcessingOptions) -> AppResult<bool> {
    let (width, height, file_size) = get_image_info(file_path)?;

    Ok(file_size > RECOMPRESS_THRESHOLD
        || width > options.max_dimension
        || height > options.max_dimension)
}

pub async fn get_file_hash(file_path: &str) -> AppResult<String> {
    let path = file_path.to_string();
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| AppError::Internal(format!("Hash task failed: {}", e)))?
}

fn hash_file(file_path: &str) -> AppResult<String> {
    const CHUNK_SIZE: usize = 64 * 1024;

    let mut file = fs::File::open(file_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::file_not_found(file_path),
        _ => AppError::Io(e),
    })?;
    let mut hasher = DefaultHasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        buffer[..bytes_read].hash(&mut hasher);
    }

    Ok(format!("{:x}", hasher.finish()))
}
