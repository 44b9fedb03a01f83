use camkit_common::config::BackendKind;
use camkit_common::error::CamResult;
use camkit_device_core::{AuthorizationStatus, DeviceInfo, MediaKind};

use crate::device::DeviceControl;
use crate::pipeline::{CapturePipeline, PipelineEventSender};

/// Abstract interface for platform-specific camera access.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Initialize the backend (e.g. load the media framework, probe devices).
    async fn init(&mut self) -> CamResult<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the host lets this process capture `kind`.
    fn authorization(&self, kind: MediaKind) -> AuthorizationStatus;

    /// Enumerate capture devices.
    fn enumerate_devices(&self) -> CamResult<Vec<DeviceInfo>>;

    /// Open a device for configuration.
    fn open_device(&self, device: &DeviceInfo) -> CamResult<Box<dyn DeviceControl>>;

    /// Build an empty pipeline that reports completions on `events`.
    fn build_pipeline(&self, events: PipelineEventSender) -> CamResult<Box<dyn CapturePipeline>>;

    /// Release backend resources.
    async fn shutdown(&self) -> CamResult<()>;
}

pub mod linux;
pub mod simulated;

pub use linux::LinuxBackend;
pub use simulated::SimulatedBackend;

/// Create and initialize the backend selected by configuration.
///
/// `Auto` uses GStreamer when a V4L2 camera is present and falls back to the
/// simulated backend otherwise.
pub async fn create_backend(kind: BackendKind) -> CamResult<Box<dyn CaptureBackend>> {
    let mut backend: Box<dyn CaptureBackend> = match kind {
        BackendKind::Gstreamer => Box::new(LinuxBackend::new()),
        BackendKind::Simulated => Box::new(SimulatedBackend::new()),
        BackendKind::Auto => {
            if camkit_platform_linux::detect_video_devices().is_empty() {
                tracing::info!("No V4L2 camera found; using simulated backend");
                Box::new(SimulatedBackend::new())
            } else {
                Box::new(LinuxBackend::new())
            }
        }
    };

    backend.init().await?;
    tracing::info!(backend = backend.name(), "Capture backend ready");
    Ok(backend)
}
