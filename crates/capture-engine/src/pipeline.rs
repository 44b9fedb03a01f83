//! Capture pipeline contract.
//!
//! A pipeline binds input devices to exactly one output (photo or video).
//! Topology changes are transactional: mutations made between
//! `begin_configuration` and `commit_configuration` become visible together,
//! so a preview never observes a half-configured graph.
//!
//! Completions (finished recordings, captured photos) are reported
//! asynchronously on the [`PipelineEventSender`] handed to the backend when
//! the pipeline is built.

use std::path::{Path, PathBuf};

use camkit_common::error::{CamError, CamResult};
use camkit_device_core::{DeviceInfo, MediaKind};
use serde::{Deserialize, Serialize};

/// The single output a pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Photo,
    Video,
}

/// Still image codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageCodec {
    #[default]
    Jpeg,
}

/// Settings for a single photo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSettings {
    pub codec: ImageCodec,
    /// Encoder quality, 1-100.
    pub quality: u8,
}

impl PhotoSettings {
    pub fn jpeg(quality: u8) -> Self {
        Self {
            codec: ImageCodec::Jpeg,
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self::jpeg(90)
    }
}

/// Identifies one photo request so its completion resolves at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhotoRequestId(pub u64);

impl std::fmt::Display for PhotoRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "photo-{}", self.0)
    }
}

/// Identifies one recording take. Ids are never reused within a session, so
/// a late completion cannot be mistaken for a newer take at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TakeId(pub u64);

impl std::fmt::Display for TakeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "take-{}", self.0)
    }
}

/// Asynchronous completion reported by a pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A recording stopped and its file was finalized (or failed).
    RecordingFinished {
        take: TakeId,
        path: PathBuf,
        result: Result<(), String>,
    },
    /// A photo request produced encoded image bytes (or failed).
    PhotoCaptured {
        id: PhotoRequestId,
        result: Result<Vec<u8>, String>,
    },
}

pub type PipelineEventSender = tokio::sync::mpsc::UnboundedSender<PipelineEvent>;
pub type PipelineEventReceiver = tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>;

/// Report a completion, tolerating a session that has already gone away.
pub(crate) fn emit(events: &PipelineEventSender, event: PipelineEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Pipeline event dropped; session is gone");
    }
}

/// Trait for a capture pipeline.
pub trait CapturePipeline: Send {
    /// Start staging topology changes.
    fn begin_configuration(&mut self);

    /// Apply staged topology changes atomically.
    fn commit_configuration(&mut self) -> CamResult<()>;

    /// Bind an input device.
    fn add_input(&mut self, device: &DeviceInfo) -> CamResult<()>;

    /// Unbind an input device.
    fn remove_input(&mut self, device: &DeviceInfo) -> CamResult<()>;

    /// Currently committed inputs.
    fn inputs(&self) -> Vec<DeviceInfo>;

    /// Install the pipeline's single output.
    fn add_output(&mut self, output: OutputKind) -> CamResult<()>;

    /// Currently committed output.
    fn output(&self) -> Option<OutputKind>;

    /// Start the pipeline running.
    fn start(&mut self) -> CamResult<()>;

    /// Stop the pipeline, finishing any active recording.
    fn stop(&mut self) -> CamResult<()>;

    /// Check if the pipeline is currently running.
    fn is_running(&self) -> bool;

    /// Begin writing the video output to `path` as take `take`.
    fn start_recording(&mut self, take: TakeId, path: &Path) -> CamResult<()>;

    /// Stop writing. Completion arrives as [`PipelineEvent::RecordingFinished`]
    /// carrying the take's id.
    fn stop_recording(&mut self) -> CamResult<()>;

    /// Whether the video output is currently writing.
    fn is_recording(&self) -> bool;

    /// Issue one photo request. Completion arrives as
    /// [`PipelineEvent::PhotoCaptured`] carrying the same id.
    fn capture_photo(&mut self, id: PhotoRequestId, settings: &PhotoSettings) -> CamResult<()>;

    /// Get pipeline statistics.
    fn stats(&self) -> PipelineStats;
}

/// Runtime statistics from a capture pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Recordings started.
    pub recordings_started: u64,

    /// Recordings stopped.
    pub recordings_stopped: u64,

    /// Photo requests issued.
    pub photos_requested: u64,

    /// Configuration transactions committed.
    pub configuration_commits: u64,
}

/// Input/output topology with begin/commit staging, shared by backends.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    live: Topology,
    staged: Option<Topology>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Topology {
    inputs: Vec<DeviceInfo>,
    output: Option<OutputKind>,
}

impl PipelineGraph {
    pub fn begin(&mut self) {
        if self.staged.is_none() {
            self.staged = Some(self.live.clone());
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// Promote staged changes. Returns `true` when the topology changed.
    pub fn commit(&mut self) -> bool {
        match self.staged.take() {
            Some(staged) => {
                let changed = staged != self.live;
                self.live = staged;
                changed
            }
            None => false,
        }
    }

    /// Drop staged changes.
    pub fn discard(&mut self) {
        self.staged = None;
    }

    fn working_mut(&mut self) -> &mut Topology {
        match self.staged {
            Some(ref mut staged) => staged,
            None => &mut self.live,
        }
    }

    pub fn add_input(&mut self, device: &DeviceInfo) -> CamResult<()> {
        let working = self.working_mut();
        if working.inputs.iter().any(|d| d.kind == device.kind) {
            return Err(CamError::capture(format!(
                "Pipeline already has a {:?} input; cannot add {}",
                device.kind, device.id
            )));
        }
        working.inputs.push(device.clone());
        Ok(())
    }

    pub fn remove_input(&mut self, device: &DeviceInfo) -> CamResult<()> {
        let working = self.working_mut();
        let before = working.inputs.len();
        working.inputs.retain(|d| d.id != device.id);
        if working.inputs.len() == before {
            return Err(CamError::capture(format!(
                "Input {} is not part of the pipeline",
                device.id
            )));
        }
        Ok(())
    }

    pub fn add_output(&mut self, output: OutputKind) -> CamResult<()> {
        let working = self.working_mut();
        if let Some(existing) = working.output {
            return Err(CamError::capture(format!(
                "Pipeline already has a {existing:?} output"
            )));
        }
        working.output = Some(output);
        Ok(())
    }

    pub fn inputs(&self) -> &[DeviceInfo] {
        &self.live.inputs
    }

    pub fn output(&self) -> Option<OutputKind> {
        self.live.output
    }

    /// Committed input of the given kind.
    pub fn input(&self, kind: MediaKind) -> Option<&DeviceInfo> {
        self.live.inputs.iter().find(|d| d.kind == kind)
    }

    /// Input of the given kind once staged changes are applied.
    pub fn staged_input(&self, kind: MediaKind) -> Option<&DeviceInfo> {
        self.staged
            .as_ref()
            .unwrap_or(&self.live)
            .inputs
            .iter()
            .find(|d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camkit_device_core::Facing;

    fn back() -> DeviceInfo {
        DeviceInfo::video("back", "Back", Facing::Back)
    }

    fn front() -> DeviceInfo {
        DeviceInfo::video("front", "Front", Facing::Front)
    }

    #[test]
    fn staged_changes_are_invisible_until_commit() {
        let mut graph = PipelineGraph::default();
        graph.add_input(&back()).unwrap();

        graph.begin();
        graph.remove_input(&back()).unwrap();
        assert_eq!(graph.inputs(), &[back()]);
        assert!(graph.staged_input(MediaKind::Video).is_none());

        graph.add_input(&front()).unwrap();
        assert!(graph.commit());
        assert_eq!(graph.inputs(), &[front()]);
    }

    #[test]
    fn one_input_per_media_kind() {
        let mut graph = PipelineGraph::default();
        graph.add_input(&back()).unwrap();
        assert!(graph.add_input(&front()).is_err());
        graph
            .add_input(&DeviceInfo::audio("default", "Mic"))
            .unwrap();
        assert_eq!(graph.inputs().len(), 2);
    }

    #[test]
    fn at_most_one_output() {
        let mut graph = PipelineGraph::default();
        graph.add_output(OutputKind::Video).unwrap();
        let err = graph.add_output(OutputKind::Photo).unwrap_err();
        assert!(err.to_string().contains("already has a Video output"));
        assert_eq!(graph.output(), Some(OutputKind::Video));
    }

    #[test]
    fn discard_restores_live_topology() {
        let mut graph = PipelineGraph::default();
        graph.add_input(&back()).unwrap();
        graph.begin();
        graph.remove_input(&back()).unwrap();
        graph.discard();
        assert!(!graph.in_transaction());
        assert_eq!(graph.input(MediaKind::Video), Some(&back()));
    }

    #[test]
    fn photo_quality_is_clamped() {
        assert_eq!(PhotoSettings::jpeg(0).quality, 1);
        assert_eq!(PhotoSettings::jpeg(250).quality, 100);
    }
}
