//! Single-shot photo capture.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};

use crate::pipeline::{PhotoRequestId, PhotoSettings};

/// A photo delivered by the pipeline.
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub request: PhotoRequestId,
    /// Encoded bytes as produced by the output (JPEG).
    pub encoded: Vec<u8>,
    /// Decoded pixels.
    pub image: DynamicImage,
    pub captured_at: DateTime<Utc>,
}

impl CapturedPhoto {
    /// Decode encoded output bytes.
    pub fn decode(request: PhotoRequestId, encoded: Vec<u8>) -> Result<Self, String> {
        let image = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)
            .map_err(|e| format!("Failed to decode photo: {e}"))?;
        Ok(Self {
            request,
            encoded,
            image,
            captured_at: Utc::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug)]
pub struct PhotoCaptureController {
    settings: PhotoSettings,
    next_id: u64,
    outstanding: BTreeSet<PhotoRequestId>,
    pending: Option<Arc<CapturedPhoto>>,
}

impl PhotoCaptureController {
    pub fn new(settings: PhotoSettings) -> Self {
        Self {
            settings,
            next_id: 1,
            outstanding: BTreeSet::new(),
            pending: None,
        }
    }

    pub fn settings(&self) -> &PhotoSettings {
        &self.settings
    }

    /// Allocate an id for a request about to be issued.
    pub fn next_request(&mut self) -> PhotoRequestId {
        let id = PhotoRequestId(self.next_id);
        self.next_id += 1;
        self.outstanding.insert(id);
        id
    }

    /// Forget a request the pipeline refused to issue.
    pub fn cancel(&mut self, id: PhotoRequestId) {
        self.outstanding.remove(&id);
    }

    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Resolve a request. Returns `None` for unknown or already resolved ids.
    pub fn on_captured(
        &mut self,
        id: PhotoRequestId,
        result: Result<Vec<u8>, String>,
    ) -> Option<Result<Arc<CapturedPhoto>, String>> {
        if !self.outstanding.remove(&id) {
            tracing::debug!(%id, "Ignoring completion for unknown photo request");
            return None;
        }

        match result.and_then(|bytes| CapturedPhoto::decode(id, bytes)) {
            Ok(photo) => {
                tracing::info!(%id, width = photo.width(), height = photo.height(), "Photo ready");
                let photo = Arc::new(photo);
                self.pending = Some(photo.clone());
                Some(Ok(photo))
            }
            Err(reason) => {
                tracing::warn!(%id, %reason, "Photo capture failed");
                Some(Err(reason))
            }
        }
    }

    pub fn pending(&self) -> Option<&Arc<CapturedPhoto>> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<Arc<CapturedPhoto>> {
        self.pending.take()
    }

    /// Drop the buffered photo and forget outstanding requests.
    pub fn clear(&mut self) {
        self.pending = None;
        self.outstanding.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn jpeg_bytes() -> Vec<u8> {
        let img = ImageBuffer::from_pixel(8, 4, Rgb([200u8, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn completion_resolves_once() {
        let mut photos = PhotoCaptureController::new(PhotoSettings::default());
        let id = photos.next_request();

        let first = photos.on_captured(id, Ok(jpeg_bytes())).unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (8, 4));
        assert!(photos.pending().is_some());
        assert!(photos.on_captured(id, Ok(jpeg_bytes())).is_none());
    }

    #[test]
    fn failure_keeps_no_image() {
        let mut photos = PhotoCaptureController::new(PhotoSettings::default());
        let id = photos.next_request();
        let result = photos.on_captured(id, Err("sensor timeout".into())).unwrap();
        assert_eq!(result.unwrap_err(), "sensor timeout");
        assert!(photos.pending().is_none());
        assert_eq!(photos.in_flight(), 0);
    }

    #[test]
    fn undecodable_bytes_are_a_failure() {
        let mut photos = PhotoCaptureController::new(PhotoSettings::default());
        let id = photos.next_request();
        let result = photos.on_captured(id, Ok(vec![1, 2, 3])).unwrap();
        assert!(result.unwrap_err().starts_with("Failed to decode photo"));
        assert!(photos.pending().is_none());
    }

    #[test]
    fn take_pending_clears_buffer() {
        let mut photos = PhotoCaptureController::new(PhotoSettings::default());
        let id = photos.next_request();
        photos.on_captured(id, Ok(jpeg_bytes()));
        assert!(photos.take_pending().is_some());
        assert!(photos.take_pending().is_none());
    }
}
