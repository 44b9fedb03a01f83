//! Async front end for a [`CaptureSession`].
//!
//! The session lives on a dedicated task. Caller commands, pipeline
//! completions and the per-second recording timer are all serialized through
//! one `select!` loop, so session state is only touched from that task.
//! Observers receive [`SessionEvent`]s over a broadcast channel; slow
//! observers may see `RecvError::Lagged`.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use camkit_common::error::{CamError, CamResult};
use camkit_device_core::PointOfInterest;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::backend::CaptureBackend;
use crate::gesture::Gesture;
use crate::outcome::Outcome;
use crate::photo::CapturedPhoto;
use crate::pipeline::PipelineEventReceiver;
use crate::preview::PreviewSurface;
use crate::session::{CaptureMode, CaptureSession, SessionConfig, SessionEvent, SessionSnapshot};
use crate::storage::MediaStore;

const COMMAND_QUEUE: usize = 32;
const EVENT_QUEUE: usize = 64;
const TICK_PERIOD: Duration = Duration::from_secs(1);

type Reply<T> = oneshot::Sender<CamResult<T>>;

enum Command {
    Setup(CaptureMode, Reply<Outcome>),
    Record(Option<String>, Reply<Outcome>),
    Stop(Reply<Outcome>),
    TakePhoto(Reply<Outcome>),
    Gesture(Gesture, Reply<Outcome>),
    FocusAt(PointOfInterest, Reply<Outcome>),
    SetZoom(f64, Reply<Outcome>),
    ToggleCamera(Reply<Outcome>),
    RemoveView(Reply<Outcome>),
    TakePendingPhoto(oneshot::Sender<Option<Arc<CapturedPhoto>>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Owner of a running session task. Dropping it tears the session down.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    store: MediaStore,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn the session task. Must be called within a Tokio runtime.
    pub fn spawn(
        backend: Arc<dyn CaptureBackend>,
        surface: Arc<dyn PreviewSurface>,
        store: MediaStore,
        config: SessionConfig,
    ) -> Self {
        let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, _) = broadcast::channel(EVENT_QUEUE);

        let session = CaptureSession::new(backend, surface, store.clone(), config, pipeline_tx);
        let task = tokio::spawn(run(session, command_rx, pipeline_rx, event_tx.clone()));

        Self {
            commands: command_tx,
            events: event_tx,
            store,
            task,
        }
    }

    /// Receive session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub async fn setup(&self, mode: CaptureMode) -> CamResult<Outcome> {
        self.request(|reply| Command::Setup(mode, reply)).await?
    }

    /// Start recording; `None` uses the default name.
    pub async fn record(&self, name: Option<&str>) -> CamResult<Outcome> {
        let name = name.map(str::to_string);
        self.request(|reply| Command::Record(name, reply)).await?
    }

    pub async fn stop(&self) -> CamResult<Outcome> {
        self.request(Command::Stop).await?
    }

    pub async fn take_photo(&self) -> CamResult<Outcome> {
        self.request(Command::TakePhoto).await?
    }

    pub async fn handle_gesture(&self, gesture: Gesture) -> CamResult<Outcome> {
        self.request(|reply| Command::Gesture(gesture, reply)).await?
    }

    pub async fn focus_at(&self, point: PointOfInterest) -> CamResult<Outcome> {
        self.request(|reply| Command::FocusAt(point, reply)).await?
    }

    pub async fn set_zoom(&self, factor: f64) -> CamResult<Outcome> {
        self.request(|reply| Command::SetZoom(factor, reply)).await?
    }

    pub async fn toggle_camera(&self) -> CamResult<Outcome> {
        self.request(Command::ToggleCamera).await?
    }

    pub async fn remove_view(&self) -> CamResult<Outcome> {
        self.request(Command::RemoveView).await?
    }

    pub async fn take_pending_photo(&self) -> CamResult<Option<Arc<CapturedPhoto>>> {
        self.request(Command::TakePendingPhoto).await
    }

    pub async fn snapshot(&self) -> CamResult<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Tear the session down and wait for its task to exit.
    pub async fn shutdown(self) -> CamResult<()> {
        self.request(Command::Shutdown).await?;
        self.task
            .await
            .map_err(|e| CamError::capture(format!("Session task failed: {e}")))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> CamResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| session_gone())?;
        response.await.map_err(|_| session_gone())
    }
}

fn session_gone() -> CamError {
    CamError::invalid_state("Session task is no longer running")
}

async fn run(
    mut session: CaptureSession,
    mut commands: mpsc::Receiver<Command>,
    mut pipeline: PipelineEventReceiver,
    events: broadcast::Sender<SessionEvent>,
) {
    let mut timer: Option<Interval> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown(done)) => {
                    teardown(&mut session, &events);
                    let _ = done.send(());
                    return;
                }
                Some(command) => apply(&mut session, command),
                None => break,
            },
            Some(event) = pipeline.recv() => session.handle_pipeline_event(event),
            _ = next_tick(&mut timer) => {
                session.tick();
            }
        }

        sync_timer(&mut timer, session.is_recording());
        publish(&mut session, &events);
    }

    if session.is_configured() {
        tracing::warn!("Session handle dropped while configured; tearing down");
    }
    teardown(&mut session, &events);
}

fn apply(session: &mut CaptureSession, command: Command) {
    // A caller that stopped waiting is not an error.
    match command {
        Command::Setup(mode, reply) => {
            let _ = reply.send(session.setup(mode));
        }
        Command::Record(name, reply) => {
            let _ = reply.send(session.record(name.as_deref()));
        }
        Command::Stop(reply) => {
            let _ = reply.send(session.stop());
        }
        Command::TakePhoto(reply) => {
            let _ = reply.send(session.take_photo());
        }
        Command::Gesture(gesture, reply) => {
            let _ = reply.send(session.handle_gesture(gesture));
        }
        Command::FocusAt(point, reply) => {
            let _ = reply.send(session.focus_at(point));
        }
        Command::SetZoom(factor, reply) => {
            let _ = reply.send(session.set_zoom(factor));
        }
        Command::ToggleCamera(reply) => {
            let _ = reply.send(session.toggle_camera());
        }
        Command::RemoveView(reply) => {
            let _ = reply.send(session.remove_view());
        }
        Command::TakePendingPhoto(reply) => {
            let _ = reply.send(session.take_pending_photo());
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(session.snapshot());
        }
        Command::Shutdown(done) => {
            let _ = done.send(());
        }
    }
}

/// Run the timer only while recording. A new timer first fires one
/// period after it is created.
fn sync_timer(timer: &mut Option<Interval>, recording: bool) {
    match (recording, timer.is_some()) {
        (true, false) => {
            let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *timer = Some(interval);
        }
        (false, true) => *timer = None,
        _ => {}
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

fn publish(session: &mut CaptureSession, events: &broadcast::Sender<SessionEvent>) {
    for event in session.drain_events() {
        // No subscribers is fine; events are notifications only.
        let _ = events.send(event);
    }
}

fn teardown(session: &mut CaptureSession, events: &broadcast::Sender<SessionEvent>) {
    if let Err(e) = session.remove_view() {
        tracing::warn!(error = %e, "Teardown failed");
    }
    publish(session, events);
}
