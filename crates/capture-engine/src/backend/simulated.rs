//! Deterministic backend with no hardware.
//!
//! Used for headless machines, demos and tests. Devices, authorization and
//! faults are configurable at runtime through a cloneable handle, and the
//! handle exposes counters so tests can observe what the session did.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camkit_common::error::{CamError, CamResult};
use camkit_device_core::{
    AuthorizationStatus, DeviceCapabilities, DeviceInfo, DeviceSettings, Facing, MediaKind,
    MAX_ZOOM_FACTOR,
};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};

use crate::backend::CaptureBackend;
use crate::device::DeviceControl;
use crate::pipeline::{
    emit, CapturePipeline, OutputKind, PhotoRequestId, PhotoSettings, PipelineEvent,
    PipelineEventSender, PipelineGraph, PipelineStats, TakeId,
};

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    devices: Mutex<Vec<DeviceInfo>>,
    video_authorization: Mutex<AuthorizationStatus>,
    audio_authorization: Mutex<AuthorizationStatus>,
    device_busy: AtomicBool,
    point_of_interest: AtomicBool,
    fail_photos: AtomicBool,
    fail_recordings: AtomicBool,
    rejected_inputs: Mutex<HashSet<String>>,
    recordings_started: AtomicU64,
    photos_requested: AtomicU64,
    committed_settings: Mutex<Vec<(String, DeviceSettings)>>,
}

/// Simulated camera backend. Clones share devices, faults and counters.
#[derive(Clone)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl SimulatedBackend {
    /// A back camera, a front camera and a microphone, all authorized.
    pub fn new() -> Self {
        Self::with_devices(vec![
            DeviceInfo::video("sim-back", "Simulated back camera", Facing::Back),
            DeviceInfo::video("sim-front", "Simulated front camera", Facing::Front),
            DeviceInfo::audio("sim-mic", "Simulated microphone"),
        ])
    }

    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            shared: Arc::new(Shared {
                devices: Mutex::new(devices),
                video_authorization: Mutex::new(AuthorizationStatus::Authorized),
                audio_authorization: Mutex::new(AuthorizationStatus::Authorized),
                device_busy: AtomicBool::new(false),
                point_of_interest: AtomicBool::new(true),
                fail_photos: AtomicBool::new(false),
                fail_recordings: AtomicBool::new(false),
                rejected_inputs: Mutex::new(HashSet::new()),
                recordings_started: AtomicU64::new(0),
                photos_requested: AtomicU64::new(0),
                committed_settings: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_authorization(self, status: AuthorizationStatus) -> Self {
        self.set_authorization(MediaKind::Video, status);
        self
    }

    pub fn set_authorization(&self, kind: MediaKind, status: AuthorizationStatus) {
        let slot = match kind {
            MediaKind::Video => &self.shared.video_authorization,
            MediaKind::Audio => &self.shared.audio_authorization,
        };
        *lock(slot) = status;
    }

    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        *lock(&self.shared.devices) = devices;
    }

    /// Make every configuration lock fail as if another client held it.
    pub fn set_device_busy(&self, busy: bool) {
        self.shared.device_busy.store(busy, Ordering::SeqCst);
    }

    /// Whether cameras report focus and exposure point-of-interest support.
    pub fn set_point_of_interest_support(&self, supported: bool) {
        self.shared.point_of_interest.store(supported, Ordering::SeqCst);
    }

    pub fn set_photo_failure(&self, fail: bool) {
        self.shared.fail_photos.store(fail, Ordering::SeqCst);
    }

    pub fn set_recording_failure(&self, fail: bool) {
        self.shared.fail_recordings.store(fail, Ordering::SeqCst);
    }

    /// Refuse to bind the device with this id as a pipeline input.
    pub fn reject_input(&self, device_id: impl Into<String>) {
        lock(&self.shared.rejected_inputs).insert(device_id.into());
    }

    pub fn recordings_started(&self) -> u64 {
        self.shared.recordings_started.load(Ordering::SeqCst)
    }

    pub fn photos_requested(&self) -> u64 {
        self.shared.photos_requested.load(Ordering::SeqCst)
    }

    /// Every settings commit, in order, as `(device id, settings)`.
    pub fn committed_settings(&self) -> Vec<(String, DeviceSettings)> {
        lock(&self.shared.committed_settings).clone()
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for SimulatedBackend {
    async fn init(&mut self) -> CamResult<()> {
        tracing::debug!(
            devices = lock(&self.shared.devices).len(),
            "Simulated backend initialized"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }

    fn authorization(&self, kind: MediaKind) -> AuthorizationStatus {
        match kind {
            MediaKind::Video => *lock(&self.shared.video_authorization),
            MediaKind::Audio => *lock(&self.shared.audio_authorization),
        }
    }

    fn enumerate_devices(&self) -> CamResult<Vec<DeviceInfo>> {
        Ok(lock(&self.shared.devices).clone())
    }

    fn open_device(&self, device: &DeviceInfo) -> CamResult<Box<dyn DeviceControl>> {
        if !lock(&self.shared.devices).contains(device) {
            return Err(CamError::device_unavailable(format!(
                "{} is not connected",
                device.id
            )));
        }
        Ok(Box::new(SimulatedDevice {
            info: device.clone(),
            settings: DeviceSettings::default(),
            locked: false,
            shared: self.shared.clone(),
        }))
    }

    fn build_pipeline(&self, events: PipelineEventSender) -> CamResult<Box<dyn CapturePipeline>> {
        Ok(Box::new(SimulatedPipeline {
            graph: PipelineGraph::default(),
            events,
            running: false,
            recording: None,
            stats: PipelineStats::default(),
            shared: self.shared.clone(),
        }))
    }

    async fn shutdown(&self) -> CamResult<()> {
        Ok(())
    }
}

struct SimulatedDevice {
    info: DeviceInfo,
    settings: DeviceSettings,
    locked: bool,
    shared: Arc<Shared>,
}

impl DeviceControl for SimulatedDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let point_of_interest = self.shared.point_of_interest.load(Ordering::SeqCst);
        DeviceCapabilities {
            focus_point_of_interest: point_of_interest,
            exposure_point_of_interest: point_of_interest,
            continuous_autofocus: true,
            max_zoom_factor: MAX_ZOOM_FACTOR,
        }
    }

    fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    fn lock_for_configuration(&mut self) -> CamResult<()> {
        if !lock(&self.shared.devices).contains(&self.info) {
            return Err(CamError::device_unavailable(format!(
                "{} was disconnected",
                self.info.id
            )));
        }
        if self.locked || self.shared.device_busy.load(Ordering::SeqCst) {
            return Err(CamError::device_busy(format!(
                "{} is locked by another client",
                self.info.id
            )));
        }
        self.locked = true;
        Ok(())
    }

    fn commit_settings(&mut self, mut settings: DeviceSettings) -> CamResult<()> {
        if !self.locked {
            return Err(CamError::invalid_state(format!(
                "{} must be locked before committing settings",
                self.info.id
            )));
        }
        settings.zoom_factor = settings
            .zoom_factor
            .clamp(1.0, self.capabilities().max_zoom_factor);
        lock(&self.shared.committed_settings).push((self.info.id.clone(), settings.clone()));
        self.settings = settings;
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.locked = false;
    }
}

struct SimulatedPipeline {
    graph: PipelineGraph,
    events: PipelineEventSender,
    running: bool,
    recording: Option<(TakeId, PathBuf)>,
    stats: PipelineStats,
    shared: Arc<Shared>,
}

impl SimulatedPipeline {
    fn require_output(&self, kind: OutputKind) -> CamResult<()> {
        if self.graph.output() != Some(kind) {
            return Err(CamError::invalid_state(format!(
                "Pipeline has no {kind:?} output"
            )));
        }
        if !self.running {
            return Err(CamError::invalid_state("Pipeline is not running"));
        }
        Ok(())
    }
}

impl CapturePipeline for SimulatedPipeline {
    fn begin_configuration(&mut self) {
        self.graph.begin();
    }

    fn commit_configuration(&mut self) -> CamResult<()> {
        self.graph.commit();
        self.stats.configuration_commits += 1;
        Ok(())
    }

    fn add_input(&mut self, device: &DeviceInfo) -> CamResult<()> {
        if lock(&self.shared.rejected_inputs).contains(&device.id) {
            return Err(CamError::capture(format!(
                "Cannot bind {} as an input",
                device.id
            )));
        }
        self.graph.add_input(device)
    }

    fn remove_input(&mut self, device: &DeviceInfo) -> CamResult<()> {
        self.graph.remove_input(device)
    }

    fn inputs(&self) -> Vec<DeviceInfo> {
        self.graph.inputs().to_vec()
    }

    fn add_output(&mut self, output: OutputKind) -> CamResult<()> {
        self.graph.add_output(output)
    }

    fn output(&self) -> Option<OutputKind> {
        self.graph.output()
    }

    fn start(&mut self) -> CamResult<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> CamResult<()> {
        if self.recording.is_some() {
            self.stop_recording()?;
        }
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start_recording(&mut self, take: TakeId, path: &Path) -> CamResult<()> {
        self.require_output(OutputKind::Video)?;
        if self.recording.is_some() {
            return Err(CamError::invalid_state("Already recording"));
        }

        std::fs::write(path, b"camkit simulated movie\n")?;
        self.recording = Some((take, path.to_path_buf()));
        self.stats.recordings_started += 1;
        self.shared.recordings_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_recording(&mut self) -> CamResult<()> {
        let (take, path) = self
            .recording
            .take()
            .ok_or_else(|| CamError::invalid_state("Not recording"))?;
        self.stats.recordings_stopped += 1;

        let result = if self.shared.fail_recordings.load(Ordering::SeqCst) {
            let _ = std::fs::remove_file(&path);
            Err("simulated encoder failure".to_string())
        } else {
            Ok(())
        };
        emit(
            &self.events,
            PipelineEvent::RecordingFinished { take, path, result },
        );
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    fn capture_photo(&mut self, id: PhotoRequestId, settings: &PhotoSettings) -> CamResult<()> {
        self.require_output(OutputKind::Photo)?;
        self.stats.photos_requested += 1;
        self.shared.photos_requested.fetch_add(1, Ordering::SeqCst);

        let result = if self.shared.fail_photos.load(Ordering::SeqCst) {
            Err("simulated sensor timeout".to_string())
        } else {
            render_test_pattern(settings.quality)
        };
        emit(&self.events, PipelineEvent::PhotoCaptured { id, result });
        Ok(())
    }

    fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }
}

/// Colour bars with a horizontal fade, encoded as JPEG.
fn render_test_pattern(quality: u8) -> Result<Vec<u8>, String> {
    const BARS: [[u8; 3]; 6] = [
        [255, 255, 255],
        [255, 255, 0],
        [0, 255, 255],
        [0, 255, 0],
        [255, 0, 255],
        [255, 0, 0],
    ];

    let frame = ImageBuffer::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        let bar = BARS[(x * BARS.len() as u32 / FRAME_WIDTH) as usize];
        let shade = 255 - (y * 128 / FRAME_HEIGHT) as u8;
        Rgb(bar.map(|c| (c as u16 * shade as u16 / 255) as u8))
    });

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&frame)
        .map_err(|e| format!("Failed to encode test pattern: {e}"))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::configure;

    #[test]
    fn test_pattern_is_valid_jpeg() {
        let bytes = render_test_pattern(90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (FRAME_WIDTH, FRAME_HEIGHT));
    }

    #[test]
    fn busy_fault_fails_the_lock() {
        let backend = SimulatedBackend::new();
        let device = backend.enumerate_devices().unwrap().remove(0);
        let mut control = backend.open_device(&device).unwrap();

        backend.set_device_busy(true);
        let err = configure(control.as_mut(), |_, s| s.zoom_factor = 2.0).unwrap_err();
        assert!(err.is_lock_failure());
        assert!(backend.committed_settings().is_empty());

        backend.set_device_busy(false);
        configure(control.as_mut(), |_, s| s.zoom_factor = 2.0).unwrap();
        assert_eq!(backend.committed_settings().len(), 1);
    }

    #[test]
    fn disconnected_device_is_unavailable() {
        let backend = SimulatedBackend::new();
        let device = backend.enumerate_devices().unwrap().remove(0);
        let mut control = backend.open_device(&device).unwrap();

        backend.set_devices(Vec::new());
        let err = configure(control.as_mut(), |_, _| {}).unwrap_err();
        assert!(matches!(err, CamError::DeviceUnavailable { .. }));
    }

    #[test]
    fn recording_round_trip_reports_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        let backend = SimulatedBackend::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut pipeline = backend.build_pipeline(tx).unwrap();

        pipeline.add_output(OutputKind::Video).unwrap();
        pipeline.start().unwrap();
        pipeline.start_recording(TakeId(7), &path).unwrap();
        assert!(path.exists());
        pipeline.stop_recording().unwrap();

        match rx.try_recv().unwrap() {
            PipelineEvent::RecordingFinished {
                take,
                path: done,
                result,
            } => {
                assert_eq!(take, TakeId(7));
                assert_eq!(done, path);
                assert!(result.is_ok());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(backend.recordings_started(), 1);
    }

    #[test]
    fn photo_requires_photo_output() {
        let backend = SimulatedBackend::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut pipeline = backend.build_pipeline(tx).unwrap();
        pipeline.add_output(OutputKind::Video).unwrap();
        pipeline.start().unwrap();

        assert!(pipeline
            .capture_photo(PhotoRequestId(1), &PhotoSettings::default())
            .is_err());
        assert_eq!(backend.photos_requested(), 0);
    }
}
