//! GStreamer/V4L2 backend for Linux.
//!
//! The camera node is opened only while a recording or photo pipeline runs;
//! V4L2 allows one streaming client per node, so no preview pipeline holds
//! it in between. Recordings and photos each get their own launch pipeline.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use camkit_common::error::{CamError, CamResult};
use camkit_device_core::{
    AuthorizationStatus, DeviceCapabilities, DeviceInfo, DeviceSettings, FocusMode, MediaKind,
    MAX_ZOOM_FACTOR, MIN_ZOOM_FACTOR,
};
use camkit_platform_linux::controls::{self, ControlSet};
use camkit_platform_linux::{detect_audio_devices, detect_video_devices, permissions};
use gst::prelude::*;
use gstreamer as gst;

use crate::backend::CaptureBackend;
use crate::device::DeviceControl;
use crate::pipeline::{
    emit, CapturePipeline, OutputKind, PhotoRequestId, PhotoSettings, PipelineEvent,
    PipelineEventSender, PipelineGraph, PipelineStats, TakeId,
};

const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

pub struct LinuxBackend {
    initialized: bool,
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self { initialized: false }
    }
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for LinuxBackend {
    async fn init(&mut self) -> CamResult<()> {
        init_gstreamer()?;
        self.initialized = true;
        tracing::info!(
            cameras = detect_video_devices().len(),
            "GStreamer initialized for V4L2 capture"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn authorization(&self, kind: MediaKind) -> AuthorizationStatus {
        permissions::authorization_status(kind)
    }

    fn enumerate_devices(&self) -> CamResult<Vec<DeviceInfo>> {
        let mut devices = detect_video_devices();
        devices.extend(detect_audio_devices());
        Ok(devices)
    }

    fn open_device(&self, device: &DeviceInfo) -> CamResult<Box<dyn DeviceControl>> {
        if device.kind != MediaKind::Video {
            return Err(CamError::unsupported(format!(
                "{} has no configurable controls",
                device.id
            )));
        }
        Ok(Box::new(V4l2Device::open(device.clone())))
    }

    fn build_pipeline(&self, events: PipelineEventSender) -> CamResult<Box<dyn CapturePipeline>> {
        if !self.initialized {
            init_gstreamer()?;
        }
        Ok(Box::new(GstSessionPipeline::new(events)))
    }

    async fn shutdown(&self) -> CamResult<()> {
        Ok(())
    }
}

/// A V4L2 camera controlled through `v4l2-ctl`.
struct V4l2Device {
    info: DeviceInfo,
    settings: DeviceSettings,
    controls: ControlSet,
    locked: bool,
}

impl V4l2Device {
    fn open(info: DeviceInfo) -> Self {
        let controls = controls::query_controls(&info.id).unwrap_or_else(|e| {
            tracing::warn!(device = %info.id, error = %e, "Could not query camera controls");
            ControlSet::default()
        });
        Self {
            info,
            settings: DeviceSettings::default(),
            controls,
            locked: false,
        }
    }
}

impl DeviceControl for V4l2Device {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            focus_point_of_interest: false,
            exposure_point_of_interest: false,
            continuous_autofocus: self.controls.continuous_focus.is_some(),
            max_zoom_factor: if self.controls.zoom.is_some() {
                MAX_ZOOM_FACTOR
            } else {
                MIN_ZOOM_FACTOR
            },
        }
    }

    fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    fn lock_for_configuration(&mut self) -> CamResult<()> {
        if !Path::new(&self.info.id).exists() {
            return Err(CamError::device_unavailable(format!(
                "{} was disconnected",
                self.info.id
            )));
        }
        if self.locked {
            return Err(CamError::device_busy(format!(
                "{} is already locked for configuration",
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

        let max_zoom = self.capabilities().max_zoom_factor;
        settings.zoom_factor = settings.zoom_factor.clamp(MIN_ZOOM_FACTOR, max_zoom);
        // V4L2 has no metering point.
        settings.focus_point = None;
        settings.exposure_point = None;

        let mut values = Vec::new();
        if let Some(range) = self.controls.zoom {
            if settings.zoom_factor != self.settings.zoom_factor {
                values.push((
                    controls::ZOOM_CONTROL,
                    controls::zoom_to_control(settings.zoom_factor, range),
                ));
            }
        }
        if let Some(name) = self.controls.continuous_focus {
            let continuous = settings.focus_mode == FocusMode::ContinuousAutoFocus;
            values.push((name, i64::from(continuous)));
        }

        controls::set_controls(&self.info.id, &values)?;
        self.settings = settings;
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.locked = false;
    }
}

/// One GStreamer launch pipeline with a drain-to-EOS shutdown.
pub struct GstCapturePipeline {
    name: String,
    pipeline: gst::Pipeline,
}

impl GstCapturePipeline {
    pub fn from_launch(name: impl Into<String>, launch: &str) -> CamResult<Self> {
        init_gstreamer()?;

        let element = gst::parse::launch(launch)
            .map_err(|e| CamError::capture(format!("Failed to build pipeline: {e}")))?;

        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| CamError::capture("Launch string did not produce a pipeline"))?;

        Ok(Self {
            name: name.into(),
            pipeline,
        })
    }

    pub fn start(&self) -> CamResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            CamError::capture(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;

        // State changes are async; wait until the source has actually opened
        // the camera.
        match self.pipeline.state(gst::ClockTime::from_seconds(10)) {
            (Ok(_), gst::State::Playing, _) => {}
            (Ok(_), state, _) => {
                tracing::warn!(
                    pipeline = %self.name,
                    ?state,
                    "Pipeline did not reach Playing state within timeout"
                );
            }
            (Err(e), _, _) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(CamError::capture(format!(
                    "{} pipeline failed to reach Playing state: {e:?}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Send EOS so muxers can finalize, drain, then tear down. Blocks for up
    /// to the drain deadline.
    pub fn finish(self) -> Result<(), String> {
        let drained = if self.pipeline.send_event(gst::event::Eos::new()) {
            self.wait_for_eos()
        } else {
            Err(format!("{} pipeline refused EOS; output may be truncated", self.name))
        };
        self.shutdown();
        drained
    }

    /// Wait for a pipeline that ends on its own (e.g. `num-buffers=1`).
    pub fn run_to_completion(self) -> Result<(), String> {
        let result = self.wait_for_eos();
        self.shutdown();
        result
    }

    fn wait_for_eos(&self) -> Result<(), String> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| format!("{} pipeline has no bus", self.name))?;

        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= DRAIN_DEADLINE {
                break;
            }
            let remaining = DRAIN_DEADLINE - elapsed;
            match bus.timed_pop(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64)) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!(pipeline = %self.name, "EOS received; pipeline drained");
                        return Ok(());
                    }
                    gst::MessageView::Error(e) => {
                        return Err(format!("{} pipeline error: {}", self.name, e.error()));
                    }
                    _ => {}
                },
                None => break,
            }
        }

        tracing::warn!(pipeline = %self.name, "EOS drain timed out after 10s");
        Err(format!("{} pipeline did not drain in time", self.name))
    }

    fn shutdown(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(pipeline = %self.name, error = ?e, "Failed to stop pipeline");
        }
    }
}

struct ActiveRecording {
    take: TakeId,
    path: PathBuf,
    runner: GstCapturePipeline,
}

/// Session pipeline: a staged topology plus per-take launch pipelines.
struct GstSessionPipeline {
    graph: PipelineGraph,
    events: PipelineEventSender,
    running: bool,
    recording: Option<ActiveRecording>,
    stats: PipelineStats,
}

impl GstSessionPipeline {
    fn new(events: PipelineEventSender) -> Self {
        Self {
            graph: PipelineGraph::default(),
            events,
            running: false,
            recording: None,
            stats: PipelineStats::default(),
        }
    }

    fn camera(&self, output: OutputKind) -> CamResult<&DeviceInfo> {
        if self.graph.output() != Some(output) {
            return Err(CamError::invalid_state(format!(
                "Pipeline has no {output:?} output"
            )));
        }
        if !self.running {
            return Err(CamError::invalid_state("Pipeline is not running"));
        }
        self.graph
            .input(MediaKind::Video)
            .ok_or_else(|| CamError::capture("Pipeline has no camera input"))
    }
}

impl CapturePipeline for GstSessionPipeline {
    fn begin_configuration(&mut self) {
        self.graph.begin();
    }

    fn commit_configuration(&mut self) -> CamResult<()> {
        if self.recording.is_some()
            && self.graph.staged_input(MediaKind::Video) != self.graph.input(MediaKind::Video)
        {
            self.graph.discard();
            return Err(CamError::unsupported(
                "Switching cameras during a V4L2 recording is not supported",
            ));
        }
        if self.graph.commit() {
            tracing::debug!(inputs = ?self.graph.inputs(), output = ?self.graph.output(), "Pipeline topology changed");
        }
        self.stats.configuration_commits += 1;
        Ok(())
    }

    fn add_input(&mut self, device: &DeviceInfo) -> CamResult<()> {
        if device.kind == MediaKind::Video && !Path::new(&device.id).exists() {
            return Err(CamError::device_unavailable(format!(
                "{} does not exist",
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
        if self.recording.is_some() {
            return Err(CamError::invalid_state("Already recording"));
        }
        let camera = self.camera(OutputKind::Video)?;
        let microphone = self.graph.input(MediaKind::Audio);
        let launch = recording_launch(&camera.id, microphone.map(|m| m.id.as_str()), path);
        tracing::debug!(%launch, "Building recording pipeline");

        let runner = GstCapturePipeline::from_launch("recording", &launch)?;
        runner.start()?;

        self.recording = Some(ActiveRecording {
            take,
            path: path.to_path_buf(),
            runner,
        });
        self.stats.recordings_started += 1;
        Ok(())
    }

    fn stop_recording(&mut self) -> CamResult<()> {
        let ActiveRecording { take, path, runner } = self
            .recording
            .take()
            .ok_or_else(|| CamError::invalid_state("Not recording"))?;
        self.stats.recordings_stopped += 1;

        let events = self.events.clone();
        std::thread::Builder::new()
            .name("camkit-recording-drain".into())
            .spawn(move || {
                let result = runner.finish();
                emit(
                    &events,
                    PipelineEvent::RecordingFinished { take, path, result },
                );
            })
            .map_err(|e| CamError::capture(format!("Failed to spawn drain thread: {e}")))?;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    fn capture_photo(&mut self, id: PhotoRequestId, settings: &PhotoSettings) -> CamResult<()> {
        let camera = self.camera(OutputKind::Photo)?;
        let target = std::env::temp_dir().join(format!("camkit-{}-{id}.jpg", std::process::id()));
        let launch = photo_launch(&camera.id, settings.quality, &target);
        let runner = GstCapturePipeline::from_launch("photo", &launch)?;
        self.stats.photos_requested += 1;

        let events = self.events.clone();
        std::thread::Builder::new()
            .name("camkit-photo".into())
            .spawn(move || {
                let result = runner
                    .start()
                    .map_err(|e| e.to_string())
                    .and_then(|()| runner.run_to_completion())
                    .and_then(|()| {
                        std::fs::read(&target).map_err(|e| format!("Failed to read photo: {e}"))
                    });
                let _ = std::fs::remove_file(&target);
                emit(&events, PipelineEvent::PhotoCaptured { id, result });
            })
            .map_err(|e| CamError::capture(format!("Failed to spawn photo thread: {e}")))?;
        Ok(())
    }

    fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }
}

/// H.264 video (plus AAC audio when a microphone is bound) muxed to QuickTime.
fn recording_launch(camera: &str, microphone: Option<&str>, output: &Path) -> String {
    let path = escape_path(output);
    let mut launch = format!(
        "qtmux name=mux ! filesink location=\"{path}\" \
         v4l2src device=\"{camera}\" do-timestamp=true ! videoconvert ! \
         x264enc tune=zerolatency speed-preset=veryfast bitrate=2500 key-int-max=60 ! \
         h264parse ! queue ! mux."
    );
    if let Some(microphone) = microphone {
        let source = if microphone == "default" {
            "pulsesrc do-timestamp=true".to_string()
        } else {
            format!("pulsesrc device=\"{microphone}\" do-timestamp=true")
        };
        launch.push_str(&format!(
            " {source} ! audioconvert ! audioresample ! avenc_aac ! aacparse ! queue ! mux."
        ));
    }
    launch
}

/// A single frame encoded as JPEG.
fn photo_launch(camera: &str, quality: u8, output: &Path) -> String {
    format!(
        "v4l2src device=\"{camera}\" num-buffers=1 ! videoconvert ! jpegenc quality={quality} ! filesink location=\"{}\"",
        escape_path(output)
    )
}

fn init_gstreamer() -> CamResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(CamError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_launch_muxes_audio_only_with_microphone() {
        let video_only = recording_launch("/dev/video0", None, Path::new("/tmp/movie.mov"));
        assert!(video_only.starts_with("qtmux name=mux ! filesink location=\"/tmp/movie.mov\""));
        assert!(video_only.contains("v4l2src device=\"/dev/video0\""));
        assert!(!video_only.contains("pulsesrc"));

        let with_audio =
            recording_launch("/dev/video0", Some("default"), Path::new("/tmp/movie.mov"));
        assert!(with_audio.contains(" pulsesrc do-timestamp=true ! audioconvert"));
        assert!(with_audio.ends_with("avenc_aac ! aacparse ! queue ! mux."));
    }

    #[test]
    fn named_microphone_is_passed_to_pulsesrc() {
        let launch = recording_launch("/dev/video2", Some("alsa_input.usb"), Path::new("/tmp/a.mov"));
        assert!(launch.contains("pulsesrc device=\"alsa_input.usb\""));
    }

    #[test]
    fn photo_launch_stops_after_one_frame() {
        let launch = photo_launch("/dev/video0", 85, Path::new("/tmp/shot.jpg"));
        assert_eq!(
            launch,
            "v4l2src device=\"/dev/video0\" num-buffers=1 ! videoconvert ! jpegenc quality=85 ! filesink location=\"/tmp/shot.jpg\""
        );
    }

    #[test]
    fn paths_with_quotes_are_escaped() {
        assert_eq!(
            escape_path(Path::new("/tmp/my \"take\".mov")),
            "/tmp/my \\\"take\\\".mov"
        );
    }

    #[test]
    fn missing_node_cannot_be_locked() {
        let mut device = V4l2Device {
            info: DeviceInfo::video(
                "/dev/video-camkit-missing",
                "Missing",
                camkit_device_core::Facing::External,
            ),
            settings: DeviceSettings::default(),
            controls: ControlSet::default(),
            locked: false,
        };
        let err = device.lock_for_configuration().unwrap_err();
        assert!(matches!(err, CamError::DeviceUnavailable { .. }));
        assert_eq!(device.capabilities().max_zoom_factor, MIN_ZOOM_FACTOR);
    }
}
