use std::fmt::Display;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

/// Provider limit for base64-encoded image requests.
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

static IMAGE_MIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^image/(png|jpe?g)$").expect("image mime pattern is valid"));

/// An uploaded image held in a temporary file.
///
/// The file is deleted when this value is dropped, whatever path the request
/// took.
#[derive(Debug)]
pub struct SpooledImage {
    file: NamedTempFile,
    pub filename: String,
    extension: String,
    pub size: usize,
}

/// Returns the data-URL subtype for an accepted image content type.
pub fn image_extension(content_type: &str) -> Result<String, AppError> {
    IMAGE_MIME
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AppError::Validation("Only PNG/JPG images are supported".to_string()))
}

pub async fn spool_image<S, E>(
    chunks: S,
    filename: String,
    content_type: &str,
    upload_dir: &Path,
) -> Result<SpooledImage, AppError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let extension = image_extension(content_type)?;

    let dir = upload_dir.to_path_buf();
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        std::fs::create_dir_all(&dir)?;
        NamedTempFile::new_in(&dir)
    })
    .await??;
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .open(file.path())
        .await?;

    let mut chunks = std::pin::pin!(chunks);
    let mut size = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| AppError::Validation(format!("Failed to read image: {}", e)))?;
        size += chunk.len();
        if size > MAX_IMAGE_BYTES {
            return Err(AppError::Validation("Image exceeds the 4MB limit".to_string()));
        }
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;

    if size == 0 {
        return Err(AppError::Validation("Image file is empty".to_string()));
    }

    tracing::debug!("Spooled {} ({} bytes) to {:?}", filename, size, file.path());
    Ok(SpooledImage {
        file,
        filename,
        extension,
        size,
    })
}

impl SpooledImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub async fn to_data_url(&self) -> Result<String, AppError> {
        let raw = tokio::fs::read(self.file.path()).await?;
        Ok(format!(
            "data:image/{};base64,{}",
            self.extension,
            STANDARD.encode(raw)
        ))
    }
}
