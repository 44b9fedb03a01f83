//! Preview surface attachment.
//!
//! The caller owns the surface; a session only attaches a rendering layer
//! and gesture handling to it during setup and detaches both on teardown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use camkit_device_core::SurfaceSize;

use crate::gesture::GestureConfig;

/// How video is fitted into the layer bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoGravity {
    /// Letterbox, keeping aspect ratio.
    ResizeAspect,
    /// Fill the bounds, keeping aspect ratio and cropping.
    #[default]
    ResizeAspectFill,
    /// Stretch to the bounds.
    Resize,
}

/// A rendering layer a session draws its preview into.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewLayer {
    pub id: u64,
    /// Stacking order; negative layers sit behind the surface's own content.
    pub z_position: i32,
    pub gravity: VideoGravity,
    pub frame: SurfaceSize,
}

impl PreviewLayer {
    /// A layer filling `bounds`, behind the surface's content.
    pub fn behind(bounds: SurfaceSize) -> Self {
        static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed),
            z_position: -1,
            gravity: VideoGravity::ResizeAspectFill,
            frame: bounds,
        }
    }
}

/// A caller-owned surface that hosts the preview.
pub trait PreviewSurface: Send + Sync {
    /// Current bounds, used for the layer frame and tap normalization.
    fn bounds(&self) -> SurfaceSize;

    fn attach_layer(&self, layer: &PreviewLayer);

    fn detach_layer(&self, layer: &PreviewLayer);

    /// Start routing the enabled gestures to the session.
    fn install_gestures(&self, _gestures: &GestureConfig) {}

    /// Stop routing gestures.
    fn remove_gestures(&self) {}
}

/// A surface with no display, for headless capture and tests.
#[derive(Debug)]
pub struct OffscreenSurface {
    bounds: SurfaceSize,
    layers: Mutex<Vec<PreviewLayer>>,
    gestures: Mutex<Option<GestureConfig>>,
}

impl OffscreenSurface {
    pub fn new(bounds: SurfaceSize) -> Self {
        Self {
            bounds,
            layers: Mutex::new(Vec::new()),
            gestures: Mutex::new(None),
        }
    }

    /// Layers currently attached.
    pub fn layers(&self) -> Vec<PreviewLayer> {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gestures currently installed.
    pub fn installed_gestures(&self) -> Option<GestureConfig> {
        *self.gestures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OffscreenSurface {
    fn default() -> Self {
        Self::new(SurfaceSize::new(1280.0, 720.0))
    }
}

impl PreviewSurface for OffscreenSurface {
    fn bounds(&self) -> SurfaceSize {
        self.bounds
    }

    fn attach_layer(&self, layer: &PreviewLayer) {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(layer.clone());
    }

    fn detach_layer(&self, layer: &PreviewLayer) {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| l.id != layer.id);
    }

    fn install_gestures(&self, gestures: &GestureConfig) {
        *self.gestures.lock().unwrap_or_else(PoisonError::into_inner) = Some(*gestures);
    }

    fn remove_gestures(&self) {
        *self.gestures.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_sit_behind_and_fill() {
        let layer = PreviewLayer::behind(SurfaceSize::new(320.0, 240.0));
        assert_eq!(layer.z_position, -1);
        assert_eq!(layer.gravity, VideoGravity::ResizeAspectFill);
        assert_eq!(layer.frame, SurfaceSize::new(320.0, 240.0));
        assert_ne!(layer.id, PreviewLayer::behind(layer.frame).id);
    }

    #[test]
    fn offscreen_surface_tracks_attachments() {
        let surface = OffscreenSurface::default();
        let layer = PreviewLayer::behind(surface.bounds());
        surface.attach_layer(&layer);
        surface.install_gestures(&GestureConfig::default());
        assert_eq!(surface.layers(), vec![layer.clone()]);
        assert!(surface.installed_gestures().is_some());

        surface.detach_layer(&layer);
        surface.remove_gestures();
        assert!(surface.layers().is_empty());
        assert!(surface.installed_gestures().is_none());
    }
}
