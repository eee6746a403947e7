//! On-disk storage for project images.
//!
//! Images are written under the upload directory with a unique name and are
//! exposed to clients under [`PUBLIC_PREFIX`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::errors::AppError;

/// URL prefix under which stored images are served.
pub const PUBLIC_PREFIX: &str = "/assets";

const ALLOWED_TYPES: [&str; 4] = ["jpeg", "jpg", "png", "gif"];

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl ImageStore {
    /// Open the store, creating the upload directory if needed.
    pub async fn open(dir: impl Into<PathBuf>, max_bytes: usize) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store an uploaded image and return its public path.
    pub async fn save(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, AppError> {
        check_file_type(original_name, content_type)?;
        if bytes.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Image exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let base = unique_file_name(original_name);
        let mut attempt = 0u32;
        loop {
            let file_name = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base, attempt)
            };
            let path = self.dir.join(&file_name);

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(bytes).await.map_err(io_error)?;
                    file.flush().await.map_err(io_error)?;
                    tracing::info!(file = %file_name, size = bytes.len(), "stored project image");
                    return Ok(format!("{}/{}", PUBLIC_PREFIX, file_name));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 16 => attempt += 1,
                Err(e) => return Err(io_error(e)),
            }
        }
    }

    /// Delete the file behind a public image path. A file that is already gone is not an error.
    pub async fn remove(&self, public_path: &str) -> Result<(), AppError> {
        let path = self.resolve(public_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %public_path, "project image already missing");
                Ok(())
            }
            Err(e) => {
                tracing::error!("File deletion error: {:?}", e);
                Err(AppError::Internal("File deletion failed!".to_string()))
            }
        }
    }

    /// Map a public path back to a file inside the upload directory.
    pub fn resolve(&self, public_path: &str) -> Result<PathBuf, AppError> {
        let file_name = public_path
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| is_plain_file_name(name))
            .ok_or_else(|| AppError::Internal(format!("Unexpected image path {}", public_path)))?;
        Ok(self.dir.join(file_name))
    }
}

/// Accept only images whose extension and mime type are both allowed.
pub fn check_file_type(file_name: &str, content_type: &str) -> Result<(), AppError> {
    let ext_ok = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_TYPES.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let mime = content_type.to_ascii_lowercase();
    let mime_ok = ALLOWED_TYPES.iter().any(|t| mime.contains(t));

    if ext_ok && mime_ok {
        Ok(())
    } else {
        Err(AppError::Validation(vec!["Error: Images Only!".to_string()]))
    }
}

/// `<stem>-<unix millis>.<ext>` with the stem reduced to safe characters.
pub fn unique_file_name(original_name: &str) -> String {
    let path = Path::new(original_name);
    let stem: String = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "image".to_string() } else { stem };
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    format!("{}-{}.{}", stem, Utc::now().timestamp_millis(), ext)
}

fn with_suffix(file_name: &str, n: u32) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, n, ext),
        None => format!("{}-{}", file_name, n),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

fn io_error(err: std::io::Error) -> AppError {
    tracing::error!("Image storage error: {:?}", err);
    AppError::Internal("Failed to store image".to_string())
}
