//! Device registry.
//!
//! Looks up capture devices through the backend. A missing device is a
//! normal outcome (hardware varies), so lookups return `Option` and are
//! never retried.

use std::sync::Arc;

use camkit_common::error::CamResult;
use camkit_device_core::{DeviceInfo, Facing, MediaKind};

use crate::backend::CaptureBackend;
use crate::device::DeviceControl;

#[derive(Clone)]
pub struct DeviceRegistry {
    backend: Arc<dyn CaptureBackend>,
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// All devices the backend reports. Enumeration failures are logged
    /// and yield an empty list.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        match self.backend.enumerate_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Device enumeration failed");
                Vec::new()
            }
        }
    }

    /// The camera a session starts with: a back camera when present,
    /// otherwise the first camera.
    pub fn default_video_device(&self) -> Option<DeviceInfo> {
        let cameras: Vec<DeviceInfo> = self
            .devices()
            .into_iter()
            .filter(|d| d.kind == MediaKind::Video)
            .collect();

        cameras
            .iter()
            .find(|d| d.facing == Facing::Back)
            .or_else(|| cameras.first())
            .cloned()
    }

    pub fn default_audio_device(&self) -> Option<DeviceInfo> {
        self.devices()
            .into_iter()
            .find(|d| d.kind == MediaKind::Audio)
    }

    /// First camera with the given facing.
    pub fn discover_devices(&self, facing: Facing) -> Option<DeviceInfo> {
        self.devices()
            .into_iter()
            .find(|d| d.kind == MediaKind::Video && d.facing == facing)
    }

    /// Open a device for configuration.
    pub fn open(&self, device: &DeviceInfo) -> CamResult<Box<dyn DeviceControl>> {
        self.backend.open_device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;

    fn registry(devices: Vec<DeviceInfo>) -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(SimulatedBackend::with_devices(devices)))
    }

    #[test]
    fn default_video_prefers_back_camera() {
        let registry = registry(vec![
            DeviceInfo::video("front", "Front", Facing::Front),
            DeviceInfo::video("back", "Back", Facing::Back),
        ]);
        assert_eq!(registry.default_video_device().unwrap().id, "back");
    }

    #[test]
    fn default_video_falls_back_to_first_camera() {
        let registry = registry(vec![
            DeviceInfo::audio("mic", "Mic"),
            DeviceInfo::video("usb", "USB", Facing::External),
        ]);
        assert_eq!(registry.default_video_device().unwrap().id, "usb");
        assert_eq!(registry.default_audio_device().unwrap().id, "mic");
    }

    #[test]
    fn missing_devices_are_none() {
        let registry = registry(vec![DeviceInfo::video("back", "Back", Facing::Back)]);
        assert!(registry.discover_devices(Facing::Front).is_none());
        assert!(registry.default_audio_device().is_none());
        assert_eq!(registry.discover_devices(Facing::Back).unwrap().id, "back");
    }
}
