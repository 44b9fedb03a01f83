//! Capture session management.
//!
//! A [`CaptureSession`] owns one configured pipeline, the camera it drives
//! and the controllers for gestures, recording and photos. It is a plain
//! synchronous state machine; [`crate::handle::SessionHandle`] runs it on a
//! task and feeds it timer ticks and pipeline completions.
//!
//! Lifecycle:
//!
//! ```text
//!   new ──setup(mode)──▶ configured ──remove_view()──▶ unconfigured
//!                          │  record / stop / take_photo
//!                          │  gestures, toggle_camera
//!                          ▼
//!                    SessionEvent outbox
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use camkit_common::config::AppConfig;
use camkit_common::error::{CamError, CamResult};
use camkit_device_core::{
    clamp_zoom, DeviceInfo, ExposureMode, FocusMode, MediaKind, PointOfInterest,
};
use serde::{Deserialize, Serialize};

use crate::backend::CaptureBackend;
use crate::device::{configure, DeviceControl};
use crate::gesture::{CameraCommand, Gesture, GestureConfig, GestureController, PinchPhase};
use crate::outcome::{Ignored, Outcome};
use crate::photo::{CapturedPhoto, PhotoCaptureController};
use crate::pipeline::{
    CapturePipeline, OutputKind, PhotoRequestId, PhotoSettings, PipelineEvent,
    PipelineEventSender, PipelineStats,
};
use crate::preview::{PreviewLayer, PreviewSurface};
use crate::recording::{RecordingCompletion, RecordingController, RecordingState};
use crate::registry::DeviceRegistry;
use crate::storage::MediaStore;

/// Name used for a recording when the caller gives none.
pub const DEFAULT_RECORDING_NAME: &str = "movie";

/// What a session captures. Fixed at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    Photo,
    Video,
}

impl CaptureMode {
    pub fn output_kind(self) -> OutputKind {
        match self {
            CaptureMode::Photo => OutputKind::Photo,
            CaptureMode::Video => OutputKind::Video,
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Gesture behaviours installed at setup.
    pub gestures: GestureConfig,

    /// Settings used for every photo request.
    pub photo: PhotoSettings,
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            gestures: config.capture.gestures.into(),
            photo: PhotoSettings::jpeg(config.capture.photo_quality),
        }
    }
}

/// Notifications for session observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Configured {
        mode: CaptureMode,
        camera: DeviceInfo,
        microphone: Option<DeviceInfo>,
    },
    RecordingStarted {
        path: PathBuf,
    },
    /// One second of recording has elapsed.
    Tick {
        elapsed_secs: u64,
    },
    RecordingStopped {
        elapsed_secs: u64,
    },
    /// The file is finalized and stored as the pending video.
    RecordingFinished {
        path: PathBuf,
        duration_secs: f64,
    },
    RecordingFailed {
        path: PathBuf,
        reason: String,
    },
    PhotoReady(Arc<CapturedPhoto>),
    PhotoFailed {
        request: PhotoRequestId,
        reason: String,
    },
    CameraSwitched {
        camera: DeviceInfo,
    },
    ZoomChanged {
        factor: f64,
    },
    TornDown,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: Option<CaptureMode>,
    pub recording: RecordingState,
    pub zoom_factor: f64,
    pub camera: Option<DeviceInfo>,
    pub microphone: Option<DeviceInfo>,
    pub pending_video: Option<PathBuf>,
    pub has_pending_photo: bool,
}

/// Everything that exists only between `setup` and `remove_view`.
struct ActiveSession {
    mode: CaptureMode,
    pipeline: Box<dyn CapturePipeline>,
    camera: Box<dyn DeviceControl>,
    microphone: Option<DeviceInfo>,
    layer: PreviewLayer,
}

/// A camera capture session bound to one preview surface.
pub struct CaptureSession {
    backend: Arc<dyn CaptureBackend>,
    registry: DeviceRegistry,
    surface: Arc<dyn PreviewSurface>,
    store: MediaStore,
    config: SessionConfig,
    pipeline_events: PipelineEventSender,
    gestures: GestureController,
    recording: RecordingController,
    photos: PhotoCaptureController,
    active: Option<ActiveSession>,
    outbox: Vec<SessionEvent>,
}

impl CaptureSession {
    /// Create an unconfigured session. Pipelines built by this session
    /// report completions on `pipeline_events`; route the receiving end
    /// back into [`handle_pipeline_event`](Self::handle_pipeline_event).
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        surface: Arc<dyn PreviewSurface>,
        store: MediaStore,
        config: SessionConfig,
        pipeline_events: PipelineEventSender,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(backend.clone()),
            backend,
            surface,
            store,
            gestures: GestureController::new(config.gestures),
            recording: RecordingController::new(),
            photos: PhotoCaptureController::new(config.photo.clone()),
            config,
            pipeline_events,
            active: None,
            outbox: Vec::new(),
        }
    }

    /// Configure the session for `mode` and start the preview.
    pub fn setup(&mut self, mode: CaptureMode) -> CamResult<Outcome> {
        if let Some(active) = &self.active {
            return Err(CamError::invalid_state(format!(
                "Session is already configured for {:?}; remove the view first",
                active.mode
            )));
        }

        let status = self.backend.authorization(MediaKind::Video);
        if !status.is_authorized() {
            tracing::warn!(?status, "Camera access is not authorized; session left unconfigured");
            return Err(CamError::permission_denied(format!(
                "Camera access is {status:?}"
            )));
        }

        let camera_info = self
            .registry
            .default_video_device()
            .ok_or_else(|| CamError::device_unavailable("No camera found"))?;
        let mut camera = self.registry.open(&camera_info)?;
        enable_continuous_autofocus(camera.as_mut());

        let mut microphone = if self.backend.authorization(MediaKind::Audio).is_authorized() {
            self.registry.default_audio_device()
        } else {
            None
        };

        let mut pipeline = self.backend.build_pipeline(self.pipeline_events.clone())?;
        pipeline.begin_configuration();
        pipeline.add_input(&camera_info)?;
        if let Some(mic) = &microphone {
            if let Err(e) = pipeline.add_input(mic) {
                tracing::warn!(device = %mic.id, error = %e, "Could not add microphone");
                microphone = None;
            }
        }
        if microphone.is_none() {
            tracing::info!("No microphone available; continuing video-only");
        }
        pipeline.add_output(mode.output_kind())?;
        pipeline.commit_configuration()?;

        let layer = PreviewLayer::behind(self.surface.bounds());
        self.surface.attach_layer(&layer);
        self.surface.install_gestures(&self.config.gestures);

        if let Err(e) = pipeline.start() {
            self.surface.remove_gestures();
            self.surface.detach_layer(&layer);
            return Err(e);
        }

        tracing::info!(
            ?mode,
            camera = %camera_info.name,
            microphone = ?microphone.as_ref().map(|m| &m.name),
            backend = self.backend.name(),
            "Capture session configured"
        );

        self.gestures = GestureController::new(self.config.gestures);
        self.outbox.push(SessionEvent::Configured {
            mode,
            camera: camera_info,
            microphone: microphone.clone(),
        });
        self.active = Some(ActiveSession {
            mode,
            pipeline,
            camera,
            microphone,
            layer,
        });
        Ok(Outcome::Applied)
    }

    /// Start recording to `<media_dir>/<name>.mov`.
    pub fn record(&mut self, name: Option<&str>) -> CamResult<Outcome> {
        let Some(active) = self.active.as_mut() else {
            return ignored("record", Ignored::NotConfigured);
        };
        if active.mode != CaptureMode::Video {
            return ignored("record", Ignored::WrongMode);
        }
        if active.pipeline.output() != Some(OutputKind::Video) {
            return ignored("record", Ignored::NoOutput);
        }
        if self.recording.is_recording() {
            return ignored("record", Ignored::AlreadyRecording);
        }

        let path = self
            .store
            .path_for(name.unwrap_or(DEFAULT_RECORDING_NAME))?;
        self.store.ensure_media_dir()?;
        let take = self.recording.next_take();
        active.pipeline.start_recording(take, &path)?;

        self.recording.begin(take, path.clone());
        self.outbox.push(SessionEvent::RecordingStarted { path });
        Ok(Outcome::Applied)
    }

    /// Stop the active recording. Its completion arrives later as a
    /// pipeline event.
    pub fn stop(&mut self) -> CamResult<Outcome> {
        let Some(active) = self.active.as_mut() else {
            return ignored("stop", Ignored::NotConfigured);
        };
        if !self.recording.is_recording() {
            return ignored("stop", Ignored::NotRecording);
        }

        let elapsed_secs = self.recording.elapsed_secs();
        let result = active.pipeline.stop_recording();
        self.recording.end();
        self.outbox.push(SessionEvent::RecordingStopped { elapsed_secs });
        result?;
        Ok(Outcome::Applied)
    }

    /// Issue one photo request.
    pub fn take_photo(&mut self) -> CamResult<Outcome> {
        let Some(active) = self.active.as_mut() else {
            return ignored("take_photo", Ignored::NotConfigured);
        };
        if active.mode != CaptureMode::Photo {
            return ignored("take_photo", Ignored::WrongMode);
        }
        if active.pipeline.output() != Some(OutputKind::Photo) {
            return ignored("take_photo", Ignored::NoOutput);
        }

        let id = self.photos.next_request();
        if let Err(e) = active.pipeline.capture_photo(id, self.photos.settings()) {
            self.photos.cancel(id);
            return Err(e);
        }
        tracing::debug!(%id, "Photo requested");
        Ok(Outcome::Applied)
    }

    /// Route a raw gesture from the preview surface.
    pub fn handle_gesture(&mut self, gesture: Gesture) -> CamResult<Outcome> {
        if self.active.is_none() {
            return ignored("gesture", Ignored::NotConfigured);
        }

        match self.gestures.interpret(gesture, self.surface.bounds()) {
            Err(reason) => ignored("gesture", reason),
            Ok(CameraCommand::Focus(point)) => self.focus_at(point),
            Ok(CameraCommand::Zoom { factor, phase }) => self.apply_zoom(factor, phase),
            Ok(CameraCommand::ToggleCamera) => self.toggle_camera(),
        }
    }

    /// Move focus and exposure metering to `point` where supported.
    pub fn focus_at(&mut self, point: PointOfInterest) -> CamResult<Outcome> {
        let Some(active) = self.active.as_mut() else {
            return ignored("focus", Ignored::NotConfigured);
        };
        let caps = active.camera.capabilities();
        if !caps.focus_point_of_interest && !caps.exposure_point_of_interest {
            return ignored("focus", Ignored::Unsupported);
        }

        configure(active.camera.as_mut(), |caps, settings| {
            if caps.focus_point_of_interest {
                settings.focus_point = Some(point);
            }
            if caps.exposure_point_of_interest {
                settings.exposure_point = Some(point);
                settings.exposure_mode = ExposureMode::AutoExpose;
            }
        })
        .map_err(|e| {
            tracing::warn!(error = %e, "Focus change failed");
            e
        })?;

        tracing::debug!(x = point.x, y = point.y, "Focus point set");
        Ok(Outcome::Applied)
    }

    /// Set the zoom factor directly, clamped to the supported range.
    pub fn set_zoom(&mut self, factor: f64) -> CamResult<Outcome> {
        if self.active.is_none() {
            return ignored("zoom", Ignored::NotConfigured);
        }
        if !factor.is_finite() {
            return ignored("zoom", Ignored::InvalidGesture);
        }
        self.apply_zoom(clamp_zoom(factor), PinchPhase::Ended)
    }

    fn apply_zoom(&mut self, factor: f64, phase: PinchPhase) -> CamResult<Outcome> {
        let Some(active) = self.active.as_mut() else {
            return ignored("zoom", Ignored::NotConfigured);
        };

        let result = configure(active.camera.as_mut(), |caps, settings| {
            settings.zoom_factor = factor.min(caps.max_zoom_factor);
        });
        let committed = match result {
            Ok(applied) => {
                self.gestures.commit_zoom(applied.zoom_factor);
                Ok(applied.zoom_factor)
            }
            Err(e) => {
                tracing::warn!(error = %e, target_factor = factor, "Zoom change failed");
                Err(e)
            }
        };
        if phase == PinchPhase::Ended {
            self.gestures.finish_pinch();
        }

        let factor = committed?;
        self.outbox.push(SessionEvent::ZoomChanged { factor });
        Ok(Outcome::Applied)
    }

    /// Switch between the back and front cameras.
    pub fn toggle_camera(&mut self) -> CamResult<Outcome> {
        let Some(active) = self.active.as_mut() else {
            return ignored("toggle_camera", Ignored::NotConfigured);
        };

        let current = active.camera.info().clone();
        let Some(next) = self
            .registry
            .discover_devices(current.facing.opposite())
            .filter(|d| d.id != current.id)
        else {
            tracing::info!(facing = ?current.facing.opposite(), "No camera to switch to");
            return ignored("toggle_camera", Ignored::NoDevice);
        };
        let mut next_camera = self.registry.open(&next)?;

        let pipeline = active.pipeline.as_mut();
        pipeline.begin_configuration();
        if let Err(e) = pipeline.remove_input(&current) {
            pipeline.commit_configuration()?;
            return Err(e);
        }
        if let Err(e) = pipeline.add_input(&next) {
            tracing::warn!(device = %next.id, error = %e, "Could not switch camera; restoring");
            if let Err(restore) = pipeline.add_input(&current) {
                tracing::error!(device = %current.id, error = %restore, "Failed to restore camera");
            }
            pipeline.commit_configuration()?;
            return Err(e);
        }
        pipeline.commit_configuration()?;

        enable_continuous_autofocus(next_camera.as_mut());
        active.camera = next_camera;
        self.gestures.reset_zoom();

        tracing::info!(from = %current.name, to = %next.name, "Switched camera");
        self.outbox.push(SessionEvent::CameraSwitched { camera: next });
        Ok(Outcome::Applied)
    }

    /// Tear the session down and detach from the surface.
    pub fn remove_view(&mut self) -> CamResult<Outcome> {
        let Some(mut active) = self.active.take() else {
            return ignored("remove_view", Ignored::NotConfigured);
        };

        if self.recording.is_recording() {
            if let Err(e) = active.pipeline.stop_recording() {
                tracing::warn!(error = %e, "Failed to stop recording during teardown");
            }
        }
        if let Err(e) = active.pipeline.stop() {
            tracing::warn!(error = %e, "Failed to stop pipeline during teardown");
        }

        self.recording.reset();
        self.photos.clear();
        self.gestures.reset_zoom();
        self.surface.remove_gestures();
        self.surface.detach_layer(&active.layer);

        tracing::info!(mode = ?active.mode, "Capture session torn down");
        self.outbox.push(SessionEvent::TornDown);
        Ok(Outcome::Applied)
    }

    /// Advance the recording timer by one second.
    pub fn tick(&mut self) -> Option<u64> {
        let elapsed_secs = self.recording.tick()?;
        self.outbox.push(SessionEvent::Tick { elapsed_secs });
        Some(elapsed_secs)
    }

    /// Apply a completion reported by the pipeline.
    pub fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::RecordingFinished { take, result, .. } => {
                match self.recording.on_finished(take, result) {
                    Some(RecordingCompletion::Finished {
                        path,
                        duration_secs,
                    }) => self.outbox.push(SessionEvent::RecordingFinished {
                        path,
                        duration_secs,
                    }),
                    Some(RecordingCompletion::Failed { path, reason }) => self
                        .outbox
                        .push(SessionEvent::RecordingFailed { path, reason }),
                    None => {}
                }
            }
            PipelineEvent::PhotoCaptured { id, result } => {
                match self.photos.on_captured(id, result) {
                    Some(Ok(photo)) => self.outbox.push(SessionEvent::PhotoReady(photo)),
                    Some(Err(reason)) => self.outbox.push(SessionEvent::PhotoFailed {
                        request: id,
                        reason,
                    }),
                    None => {}
                }
            }
        }
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn is_configured(&self) -> bool {
        self.active.is_some()
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.active.as_ref().map(|a| a.mode)
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording.state()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.recording.elapsed_secs()
    }

    pub fn zoom_factor(&self) -> f64 {
        self.gestures.zoom().factor
    }

    pub fn gesture_config(&self) -> &GestureConfig {
        self.gestures.config()
    }

    pub fn active_video_device(&self) -> Option<&DeviceInfo> {
        self.active.as_ref().map(|a| a.camera.info())
    }

    pub fn active_audio_device(&self) -> Option<&DeviceInfo> {
        self.active.as_ref().and_then(|a| a.microphone.as_ref())
    }

    pub fn pending_photo(&self) -> Option<Arc<CapturedPhoto>> {
        self.photos.pending().cloned()
    }

    /// Hand the buffered photo to the caller.
    pub fn take_pending_photo(&mut self) -> Option<Arc<CapturedPhoto>> {
        self.photos.take_pending()
    }

    pub fn pending_video(&self) -> Option<&Path> {
        self.recording.pending_video()
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn pipeline_stats(&self) -> Option<PipelineStats> {
        self.active.as_ref().map(|a| a.pipeline.stats())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode(),
            recording: self.recording_state(),
            zoom_factor: self.zoom_factor(),
            camera: self.active_video_device().cloned(),
            microphone: self.active_audio_device().cloned(),
            pending_video: self.pending_video().map(Path::to_path_buf),
            has_pending_photo: self.photos.pending().is_some(),
        }
    }
}

fn ignored(command: &str, reason: Ignored) -> CamResult<Outcome> {
    tracing::debug!(command, %reason, "Command ignored");
    Ok(Outcome::Ignored(reason))
}

/// Best effort: a camera without continuous autofocus still works.
fn enable_continuous_autofocus(camera: &mut dyn DeviceControl) {
    if !camera.capabilities().continuous_autofocus {
        return;
    }
    if let Err(e) = configure(camera, |_, settings| {
        settings.focus_mode = FocusMode::ContinuousAutoFocus;
    }) {
        tracing::warn!(device = %camera.info().id, error = %e, "Could not enable continuous autofocus");
    }
}
