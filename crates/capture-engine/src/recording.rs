//! Recording state machine.
//!
//! ```text
//!            record()                     stop() / failure
//!   Idle ───────────────▶ Recording(n) ───────────────────▶ Idle
//!                          │      ▲
//!                          └─tick─┘  n += 1 once per second
//! ```
//!
//! Only one take is written at a time. A stopped take waits for the
//! pipeline's completion, matched by its [`TakeId`]; several stopped takes
//! may be waiting at once. Each completion is accepted once, and completions
//! for takes discarded by [`RecordingController::reset`] are dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use camkit_common::clock::RecordingClock;

use crate::pipeline::TakeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording {
        elapsed_secs: u64,
    },
}

/// How a take ended, as reported by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingCompletion {
    Finished { path: PathBuf, duration_secs: f64 },
    Failed { path: PathBuf, reason: String },
}

#[derive(Debug)]
struct Take {
    id: TakeId,
    path: PathBuf,
    clock: RecordingClock,
    duration_secs: Option<f64>,
}

#[derive(Debug, Default)]
pub struct RecordingController {
    state: RecordingState,
    last_take: u64,
    active: Option<Take>,
    awaiting: BTreeMap<TakeId, Take>,
    pending_video: Option<PathBuf>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecordingState::Recording { .. })
    }

    pub fn elapsed_secs(&self) -> u64 {
        match self.state {
            RecordingState::Recording { elapsed_secs } => elapsed_secs,
            RecordingState::Idle => 0,
        }
    }

    /// Path of the take being written.
    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|take| take.path.as_path())
    }

    /// Stopped takes whose completion has not arrived yet.
    pub fn awaiting(&self) -> usize {
        self.awaiting.len()
    }

    /// Location of the last successfully finished take.
    pub fn pending_video(&self) -> Option<&Path> {
        self.pending_video.as_deref()
    }

    /// Allocate the id for a take about to be started.
    pub fn next_take(&mut self) -> TakeId {
        self.last_take += 1;
        TakeId(self.last_take)
    }

    /// Idle -> Recording(0). The caller has already started the output.
    pub fn begin(&mut self, id: TakeId, path: PathBuf) {
        debug_assert!(!self.is_recording());
        tracing::info!(%id, path = %path.display(), "Recording started");
        self.active = Some(Take {
            id,
            path,
            clock: RecordingClock::start(),
            duration_secs: None,
        });
        self.state = RecordingState::Recording { elapsed_secs: 0 };
    }

    /// Recording -> Idle. The take now waits for its completion.
    pub fn end(&mut self) {
        if let Some(mut take) = self.active.take() {
            let duration = take.clock.elapsed_secs();
            tracing::info!(
                id = %take.id,
                path = %take.path.display(),
                duration_secs = duration,
                ticks = self.elapsed_secs(),
                "Recording stopped"
            );
            take.duration_secs = Some(duration);
            self.awaiting.insert(take.id, take);
        }
        self.state = RecordingState::Idle;
    }

    /// One timer tick. Returns the new elapsed seconds while recording.
    pub fn tick(&mut self) -> Option<u64> {
        match &mut self.state {
            RecordingState::Recording { elapsed_secs } => {
                *elapsed_secs += 1;
                Some(*elapsed_secs)
            }
            RecordingState::Idle => None,
        }
    }

    /// Apply a pipeline completion. Completions for unknown or discarded
    /// takes, or repeated completions, are ignored.
    pub fn on_finished(
        &mut self,
        id: TakeId,
        result: Result<(), String>,
    ) -> Option<RecordingCompletion> {
        let take = if let Some(take) = self.awaiting.remove(&id) {
            take
        } else if self.active.as_ref().is_some_and(|t| t.id == id) {
            // The output stopped on its own while still recording.
            self.state = RecordingState::Idle;
            self.active.take()?
        } else {
            tracing::debug!(%id, "Ignoring completion for unknown take");
            return None;
        };

        let duration_secs = take
            .duration_secs
            .unwrap_or_else(|| take.clock.elapsed_secs());

        match result {
            Ok(()) => {
                tracing::info!(
                    id = %take.id,
                    path = %take.path.display(),
                    duration_secs,
                    "Recording finalized"
                );
                self.pending_video = Some(take.path.clone());
                Some(RecordingCompletion::Finished {
                    path: take.path,
                    duration_secs,
                })
            }
            Err(reason) => {
                tracing::warn!(
                    id = %take.id,
                    path = %take.path.display(),
                    %reason,
                    "Recording failed; discarding take"
                );
                Some(RecordingCompletion::Failed {
                    path: take.path,
                    reason,
                })
            }
        }
    }

    /// Forget everything (teardown). Take ids keep counting up.
    pub fn reset(&mut self) {
        self.state = RecordingState::Idle;
        self.active = None;
        self.awaiting.clear();
        self.pending_video = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(rec: &mut RecordingController, path: &str) -> TakeId {
        let id = rec.next_take();
        rec.begin(id, PathBuf::from(path));
        id
    }

    #[test]
    fn ticks_count_only_while_recording() {
        let mut rec = RecordingController::new();
        assert_eq!(rec.tick(), None);

        start(&mut rec, "/tmp/clip.mov");
        assert_eq!(rec.tick(), Some(1));
        assert_eq!(rec.tick(), Some(2));
        assert_eq!(rec.state(), RecordingState::Recording { elapsed_secs: 2 });

        rec.end();
        assert_eq!(rec.tick(), None);
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[test]
    fn a_new_take_starts_from_zero() {
        let mut rec = RecordingController::new();
        start(&mut rec, "/tmp/a.mov");
        rec.tick();
        rec.end();
        start(&mut rec, "/tmp/b.mov");
        assert_eq!(rec.elapsed_secs(), 0);
    }

    #[test]
    fn successful_completion_is_stored_once() {
        let path = PathBuf::from("/tmp/clip.mov");
        let mut rec = RecordingController::new();
        let id = start(&mut rec, "/tmp/clip.mov");
        rec.end();

        let done = rec.on_finished(id, Ok(())).unwrap();
        assert!(matches!(done, RecordingCompletion::Finished { .. }));
        assert_eq!(rec.pending_video(), Some(path.as_path()));
        assert!(rec.on_finished(id, Ok(())).is_none());
    }

    #[test]
    fn failed_completion_stores_nothing() {
        let mut rec = RecordingController::new();
        let id = start(&mut rec, "/tmp/clip.mov");
        rec.end();

        let done = rec.on_finished(id, Err("disk full".into())).unwrap();
        assert_eq!(
            done,
            RecordingCompletion::Failed {
                path: PathBuf::from("/tmp/clip.mov"),
                reason: "disk full".into()
            }
        );
        assert!(rec.pending_video().is_none());
    }

    #[test]
    fn failure_while_recording_returns_to_idle() {
        let mut rec = RecordingController::new();
        let id = start(&mut rec, "/tmp/clip.mov");
        rec.on_finished(id, Err("device unplugged".into()));
        assert_eq!(rec.state(), RecordingState::Idle);
        assert!(rec.active_path().is_none());
    }

    #[test]
    fn unknown_completion_is_ignored() {
        let mut rec = RecordingController::new();
        let id = start(&mut rec, "/tmp/a.mov");
        assert!(rec.on_finished(TakeId(id.0 + 1), Ok(())).is_none());
        assert!(rec.is_recording());
    }

    #[test]
    fn completion_of_a_discarded_take_does_not_end_a_new_take_at_the_same_path() {
        let mut rec = RecordingController::new();
        let old = start(&mut rec, "/tmp/movie.mov");
        rec.reset();
        let new = start(&mut rec, "/tmp/movie.mov");
        assert_ne!(old, new);

        assert!(rec.on_finished(old, Ok(())).is_none());
        assert!(rec.is_recording());
        assert_eq!(rec.active_path(), Some(Path::new("/tmp/movie.mov")));
        assert!(rec.pending_video().is_none());
    }

    #[test]
    fn every_stopped_take_gets_its_completion() {
        let mut rec = RecordingController::new();
        let a = start(&mut rec, "/tmp/a.mov");
        rec.end();
        let b = start(&mut rec, "/tmp/b.mov");
        rec.end();
        assert_eq!(rec.awaiting(), 2);

        let first = rec.on_finished(a, Ok(())).unwrap();
        assert!(matches!(
            first,
            RecordingCompletion::Finished { ref path, .. } if path == Path::new("/tmp/a.mov")
        ));
        assert_eq!(rec.pending_video(), Some(Path::new("/tmp/a.mov")));

        let second = rec.on_finished(b, Ok(())).unwrap();
        assert!(matches!(
            second,
            RecordingCompletion::Finished { ref path, .. } if path == Path::new("/tmp/b.mov")
        ));
        assert_eq!(rec.pending_video(), Some(Path::new("/tmp/b.mov")));
        assert_eq!(rec.awaiting(), 0);
    }
}
