use crate::config::media::{MediaBackend, MediaConfig, S3Config};
use crate::error::{AppError, AppResult, FieldError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream, Client};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

pub const PHOTO_FOLDER: &str = "reports";

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// A photo received with a report submission, not yet stored anywhere.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

fn matches_magic_bytes(data: &[u8], content_type: &str) -> bool {
    match content_type {
        "image/jpeg" | "image/jpg" => data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF],
        "image/png" => data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47],
        _ => false,
    }
}

/// Checks size, declared type and content before anything is written.
/// Returns the file extension to store under.
pub fn validate_photo(photo: &PhotoUpload, max_bytes: usize) -> AppResult<&'static str> {
    let mut errors = Vec::new();
    let content_type = photo.content_type.trim().to_ascii_lowercase();

    if photo.bytes.len() > max_bytes {
        errors.push(FieldError::new(
            "photo",
            format!(
                "File too large. Maximum size is {}MB",
                max_bytes / (1024 * 1024)
            ),
        ));
    }
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        errors.push(FieldError::new(
            "photo",
            "Only image files (jpeg, jpg, png) are allowed",
        ));
    } else if !matches_magic_bytes(&photo.bytes, &content_type) {
        errors.push(FieldError::new(
            "photo",
            "File content does not match declared content type",
        ));
    }

    if !errors.is_empty() {
        return Err(AppError::ValidationFailed(errors));
    }
    Ok(if content_type == "image/png" { "png" } else { "jpg" })
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Stores the bytes and returns the public URL.
    async fn upload(&self, photo: &PhotoUpload, folder: &str, ext: &str) -> AppResult<String>;

    async fn delete(&self, url: &str) -> AppResult<()>;
}

pub struct S3MediaStorage {
    client: Client,
    config: S3Config,
}

impl S3MediaStorage {
    pub async fn connect(config: S3Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
            config,
        }
    }
}

#[async_trait]
impl MediaStorage for S3MediaStorage {
    async fn upload(&self, photo: &PhotoUpload, folder: &str, ext: &str) -> AppResult<String> {
        let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(&photo.content_type)
            .body(ByteStream::from(photo.bytes.clone()))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("put {key}: {}", DisplayErrorContext(&e))))?;
        Ok(self.config.object_url(&key))
    }

    async fn delete(&self, url: &str) -> AppResult<()> {
        let key = self
            .config
            .key_from_url(url)
            .ok_or_else(|| AppError::Upstream(format!("not an object in this bucket: {url}")))?;
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("delete {key}: {}", DisplayErrorContext(&e))))?;
        Ok(())
    }
}

/// Files under a directory that the router serves at `/uploads`.
pub struct LocalMediaStorage {
    root: PathBuf,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix("/uploads/")?;
        if relative.split('/').any(|part| part.is_empty() || part == "..") {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn upload(&self, photo: &PhotoUpload, folder: &str, ext: &str) -> AppResult<String> {
        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let dir = self.root.join(folder);

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Upstream(format!("create {}: {}", dir.display(), e)))?;
        let file_path = dir.join(&filename);
        fs::write(&file_path, &photo.bytes)
            .await
            .map_err(|e| AppError::Upstream(format!("write {}: {}", file_path.display(), e)))?;

        Ok(format!("/uploads/{}/{}", folder, filename))
    }

    async fn delete(&self, url: &str) -> AppResult<()> {
        let path = self
            .path_for(url)
            .ok_or_else(|| AppError::Upstream(format!("not a local upload: {url}")))?;
        fs::remove_file(&path)
            .await
            .map_err(|e| AppError::Upstream(format!("remove {}: {}", path.display(), e)))
    }
}

/// Shared photo pipeline: validation in front of whichever storage is configured.
#[derive(Clone)]
pub struct MediaService {
    storage: Arc<dyn MediaStorage>,
    max_upload_bytes: usize,
}

impl MediaService {
    pub fn new(storage: Arc<dyn MediaStorage>, max_upload_bytes: usize) -> Self {
        Self {
            storage,
            max_upload_bytes,
        }
    }

    pub async fn from_config(config: &MediaConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn MediaStorage> = match &config.backend {
            MediaBackend::Local { upload_dir } => {
                std::fs::create_dir_all(upload_dir).map_err(|e| {
                    anyhow::anyhow!("Failed to create upload directory '{}': {}", upload_dir, e)
                })?;
                tracing::info!("Media stored on disk under {}", upload_dir);
                Arc::new(LocalMediaStorage::new(Path::new(upload_dir)))
            }
            MediaBackend::S3(s3) => {
                tracing::info!("Media stored in S3 bucket {}", s3.bucket);
                Arc::new(S3MediaStorage::connect(s3.clone()).await)
            }
        };
        Ok(Self::new(storage, config.max_upload_bytes))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn store_photo(&self, photo: &PhotoUpload) -> AppResult<String> {
        let ext = validate_photo(photo, self.max_upload_bytes)?;
        self.storage.upload(photo, PHOTO_FOLDER, ext).await
    }

    /// Cleanup path: failures are logged, never returned.
    pub async fn remove_best_effort(&self, url: &str) {
        if let Err(e) = self.storage.delete(url).await {
            tracing::warn!("Failed to delete media {}: {}", url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const PNG: [u8; 6] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];

    fn photo(bytes: &[u8], content_type: &str) -> PhotoUpload {
        PhotoUpload {
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
            file_name: Some("pothole.jpg".to_string()),
        }
    }

    #[test]
    fn accepts_jpeg_and_png() {
        assert_eq!(validate_photo(&photo(&JPEG, "image/jpeg"), 1024).unwrap(), "jpg");
        assert_eq!(validate_photo(&photo(&JPEG, "image/jpg"), 1024).unwrap(), "jpg");
        assert_eq!(validate_photo(&photo(&PNG, "image/png"), 1024).unwrap(), "png");
    }

    #[test]
    fn rejects_other_types() {
        let gif = [0x47, 0x49, 0x46, 0x38, 0x39, 0x61];
        assert!(validate_photo(&photo(&gif, "image/gif"), 1024).is_err());
    }

    #[test]
    fn rejects_mismatched_content() {
        assert!(validate_photo(&photo(&PNG, "image/jpeg"), 1024).is_err());
        assert!(validate_photo(&photo(&[], "image/png"), 1024).is_err());
    }

    #[test]
    fn rejects_oversized_before_storage() {
        let mut big = JPEG.to_vec();
        big.resize(2048, 0);
        match validate_photo(&photo(&big, "image/jpeg"), 1024) {
            Err(AppError::ValidationFailed(errors)) => {
                assert_eq!(errors[0].field, "photo");
                assert!(errors[0].message.starts_with("File too large"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaService::new(Arc::new(LocalMediaStorage::new(dir.path())), 1024);

        let url = media.store_photo(&photo(&PNG, "image/png")).await.unwrap();
        assert!(url.starts_with("/uploads/reports/"));
        assert!(url.ends_with(".png"));

        let on_disk = dir.path().join(url.trim_start_matches("/uploads/"));
        assert!(on_disk.exists());

        media.remove_best_effort(&url).await;
        assert!(!on_disk.exists());

        // A second delete fails inside and is swallowed.
        media.remove_best_effort(&url).await;
    }

    #[test]
    fn local_paths_stay_inside_root() {
        let storage = LocalMediaStorage::new("/srv/uploads");
        assert!(storage.path_for("/uploads/reports/a.png").is_some());
        assert!(storage.path_for("/uploads/../etc/passwd").is_none());
        assert!(storage.path_for("https://cdn.example.org/a.png").is_none());
    }
}
