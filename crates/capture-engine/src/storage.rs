//! Storage utilities for recordings and the shared media library.
//!
//! Recordings are addressed by a logical name and live under the
//! application-private media directory as `<name>.mov`. Finished media can
//! be copied into the user's library; those copies run on a background
//! task and callers may ignore or await the returned handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use camkit_common::clock::file_timestamp;
use camkit_common::config::AppConfig;
use camkit_common::error::{CamError, CamResult};
use tokio::task::JoinHandle;

use crate::photo::CapturedPhoto;

/// File extension of recordings.
pub const VIDEO_EXTENSION: &str = "mov";

/// Library subdirectory for photos.
pub const PHOTOS_SUBDIR: &str = "Pictures";

/// Library subdirectory for videos.
pub const VIDEOS_SUBDIR: &str = "Videos";

#[derive(Debug, Clone)]
pub struct MediaStore {
    media_dir: PathBuf,
    library_dir: PathBuf,
}

impl MediaStore {
    pub fn new(media_dir: impl Into<PathBuf>, library_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
            library_dir: library_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.media_dir, &config.library_dir)
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Reject names that would escape the media directory.
    pub fn validate_name(name: &str) -> CamResult<()> {
        let bad = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if bad {
            return Err(CamError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Where a recording named `name` is written.
    pub fn path_for(&self, name: &str) -> CamResult<PathBuf> {
        Self::validate_name(name)?;
        Ok(self.media_dir.join(format!("{name}.{VIDEO_EXTENSION}")))
    }

    pub fn ensure_media_dir(&self) -> CamResult<()> {
        std::fs::create_dir_all(&self.media_dir).map_err(|e| {
            CamError::storage(format!(
                "Failed to create media directory {}: {e}",
                self.media_dir.display()
            ))
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Delete a recording. Returns whether a file was removed; a missing
    /// file is not an error.
    pub fn delete(&self, name: &str) -> CamResult<bool> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Ok(false);
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Deleted recording");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy a photo into the library. Must be called within a Tokio runtime.
    pub fn save_photo(&self, photo: Arc<CapturedPhoto>) -> JoinHandle<CamResult<PathBuf>> {
        let target = self
            .library_dir
            .join(PHOTOS_SUBDIR)
            .join(format!("IMG_{}.jpg", file_timestamp()));

        tokio::spawn(async move {
            let result = write_into_library(&target, &photo.encoded).await;
            log_saved("photo", &result);
            result
        })
    }

    /// Copy a finished recording into the library. Must be called within a
    /// Tokio runtime.
    pub fn save_video(&self, source: PathBuf) -> JoinHandle<CamResult<PathBuf>> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "movie".to_string());
        let target = self
            .library_dir
            .join(VIDEOS_SUBDIR)
            .join(format!("{stem}_{}.{VIDEO_EXTENSION}", file_timestamp()));

        tokio::spawn(async move {
            let result = copy_into_library(&source, &target).await;
            log_saved("video", &result);
            result
        })
    }
}

async fn write_into_library(target: &Path, bytes: &[u8]) -> CamResult<PathBuf> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, bytes).await?;
    Ok(target.to_path_buf())
}

async fn copy_into_library(source: &Path, target: &Path) -> CamResult<PathBuf> {
    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        return Err(CamError::FileNotFound {
            path: source.to_path_buf(),
        });
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(source, target).await?;
    Ok(target.to_path_buf())
}

fn log_saved(kind: &str, result: &CamResult<PathBuf>) {
    match result {
        Ok(path) => tracing::info!(kind, path = %path.display(), "Saved to media library"),
        Err(e) => tracing::warn!(kind, error = %e, "Failed to save to media library"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PhotoRequestId;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

    fn store() -> (tempfile::TempDir, MediaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("media"), dir.path().join("library"));
        store.ensure_media_dir().unwrap();
        (dir, store)
    }

    #[test]
    fn paths_use_mov_extension() {
        let (_dir, store) = store();
        let path = store.path_for("clip").unwrap();
        assert_eq!(path, store.media_dir().join("clip.mov"));
    }

    #[test]
    fn names_cannot_escape_media_dir() {
        for name in ["", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(MediaStore::validate_name(name).is_err(), "{name:?}");
        }
        assert!(!MediaStore::new("/nonexistent", "/nonexistent").exists("../x"));
    }

    #[test]
    fn delete_missing_file_returns_false_and_changes_nothing() {
        let (_dir, store) = store();
        std::fs::write(store.path_for("other").unwrap(), b"keep").unwrap();

        assert!(!store.delete("clip").unwrap());
        assert!(store.exists("other"));
        assert_eq!(std::fs::read_dir(store.media_dir()).unwrap().count(), 1);
    }

    #[test]
    fn delete_existing_file_removes_it() {
        let (_dir, store) = store();
        std::fs::write(store.path_for("clip").unwrap(), b"movie").unwrap();
        assert!(store.exists("clip"));

        assert!(store.delete("clip").unwrap());
        assert!(!store.exists("clip"));
    }

    #[tokio::test]
    async fn save_video_copies_into_library() {
        let (_dir, store) = store();
        let source = store.path_for("clip").unwrap();
        std::fs::write(&source, b"movie").unwrap();

        let saved = store.save_video(source.clone()).await.unwrap().unwrap();
        assert!(saved.starts_with(store.library_dir().join(VIDEOS_SUBDIR)));
        assert!(saved.file_name().unwrap().to_string_lossy().starts_with("clip_"));
        assert_eq!(std::fs::read(saved).unwrap(), b"movie");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn save_video_reports_missing_source() {
        let (_dir, store) = store();
        let err = store
            .save_video(store.path_for("ghost").unwrap())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, CamError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn save_photo_writes_jpeg_bytes() {
        let (_dir, store) = store();
        let mut encoded = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(4, 4, Rgb([0u8, 128, 255])))
            .write_to(&mut encoded, ImageFormat::Jpeg)
            .unwrap();
        let photo = CapturedPhoto::decode(PhotoRequestId(1), encoded.into_inner()).unwrap();

        let saved = store.save_photo(Arc::new(photo.clone())).await.unwrap().unwrap();
        assert_eq!(saved.extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(saved).unwrap(), photo.encoded);
    }
}
