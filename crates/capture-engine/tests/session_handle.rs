use std::sync::Arc;
use std::time::Duration;

use camkit_capture_engine::{
    CaptureMode, Gesture, GestureConfig, Ignored, MediaStore, OffscreenSurface, Outcome,
    RecordingState, SessionConfig, SessionEvent, SessionHandle, SimulatedBackend,
};
use camkit_device_core::Facing;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

struct Fixture {
    _dir: tempfile::TempDir,
    backend: SimulatedBackend,
    surface: Arc<OffscreenSurface>,
    handle: SessionHandle,
}

fn fixture(gestures: GestureConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path().join("media"), dir.path().join("library"));
    let backend = SimulatedBackend::new();
    let surface = Arc::new(OffscreenSurface::default());
    let handle = SessionHandle::spawn(
        Arc::new(backend.clone()),
        surface.clone(),
        store,
        SessionConfig {
            gestures,
            ..SessionConfig::default()
        },
    );
    Fixture {
        _dir: dir,
        backend,
        surface,
        handle,
    }
}

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Events received so far, without waiting.
fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn ticks(events: &[SessionEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Tick { elapsed_secs } => Some(*elapsed_secs),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn recording_ticks_once_per_second_until_stopped() {
    let f = fixture(GestureConfig::default());
    let mut events = f.handle.subscribe();

    f.handle.setup(CaptureMode::Video).await.unwrap();
    assert_eq!(f.handle.record(Some("clip")).await.unwrap(), Outcome::Applied);
    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(f.handle.stop().await.unwrap(), Outcome::Applied);

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let finished = matches!(event, SessionEvent::RecordingFinished { .. });
        seen.push(event);
        if finished {
            break;
        }
    }
    assert_eq!(ticks(&seen), vec![1, 2, 3]);

    sleep(Duration::from_secs(3)).await;
    assert!(ticks(&drain(&mut events)).is_empty());

    assert!(f.handle.store().exists("clip"));
    let snapshot = f.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording, RecordingState::Idle);
    assert_eq!(
        snapshot.pending_video,
        Some(f.handle.store().path_for("clip").unwrap())
    );
}

#[tokio::test(start_paused = true)]
async fn a_new_take_counts_from_zero() {
    let f = fixture(GestureConfig::default());
    let mut events = f.handle.subscribe();
    f.handle.setup(CaptureMode::Video).await.unwrap();

    f.handle.record(None).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;
    f.handle.stop().await.unwrap();
    drain(&mut events);

    f.handle.record(None).await.unwrap();
    assert_eq!(
        f.handle.snapshot().await.unwrap().recording,
        RecordingState::Recording { elapsed_secs: 0 }
    );
    sleep(Duration::from_millis(1_200)).await;
    f.handle.stop().await.unwrap();
    assert_eq!(ticks(&drain(&mut events)), vec![1]);
}

#[tokio::test]
async fn second_record_while_recording_starts_nothing() {
    let f = fixture(GestureConfig::default());
    f.handle.setup(CaptureMode::Video).await.unwrap();

    assert_eq!(f.handle.record(None).await.unwrap(), Outcome::Applied);
    assert_eq!(
        f.handle.record(Some("other")).await.unwrap(),
        Outcome::Ignored(Ignored::AlreadyRecording)
    );
    assert_eq!(f.backend.recordings_started(), 1);
    assert!(!f.handle.store().exists("other"));
}

#[tokio::test]
async fn stop_while_idle_is_ignored() {
    let f = fixture(GestureConfig::default());
    f.handle.setup(CaptureMode::Video).await.unwrap();
    assert_eq!(
        f.handle.stop().await.unwrap(),
        Outcome::Ignored(Ignored::NotRecording)
    );
}

#[tokio::test]
async fn photo_is_delivered_exactly_once() {
    let f = fixture(GestureConfig::default());
    let mut events = f.handle.subscribe();
    f.handle.setup(CaptureMode::Photo).await.unwrap();
    f.handle.take_photo().await.unwrap();

    let photo = loop {
        if let SessionEvent::PhotoReady(photo) = next_event(&mut events).await {
            break photo;
        }
    };
    assert_eq!((photo.width(), photo.height()), (320, 240));

    // Round-trip through the actor so any duplicate would have been published.
    f.handle.snapshot().await.unwrap();
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::PhotoReady(_))));

    let pending = f.handle.take_pending_photo().await.unwrap().unwrap();
    assert!(f.handle.take_pending_photo().await.unwrap().is_none());

    let saved = f.handle.store().save_photo(pending).await.unwrap().unwrap();
    assert!(saved.exists());
}

#[tokio::test]
async fn photo_failure_is_reported_without_storing() {
    let f = fixture(GestureConfig::default());
    let mut events = f.handle.subscribe();
    f.backend.set_photo_failure(true);
    f.handle.setup(CaptureMode::Photo).await.unwrap();
    f.handle.take_photo().await.unwrap();

    loop {
        if let SessionEvent::PhotoFailed { .. } = next_event(&mut events).await {
            break;
        }
    }
    assert!(!f.handle.snapshot().await.unwrap().has_pending_photo);
}

#[tokio::test]
async fn double_tap_twice_returns_to_original_camera() {
    let f = fixture(GestureConfig::default());
    f.handle.setup(CaptureMode::Video).await.unwrap();
    let original = f.handle.snapshot().await.unwrap().camera.unwrap();
    assert_eq!(original.facing, Facing::Back);

    f.handle.handle_gesture(Gesture::DoubleTap).await.unwrap();
    let switched = f.handle.snapshot().await.unwrap().camera.unwrap();
    assert_eq!(switched.facing, Facing::Front);

    f.handle.handle_gesture(Gesture::DoubleTap).await.unwrap();
    assert_eq!(f.handle.snapshot().await.unwrap().camera, Some(original));
}

#[tokio::test]
async fn delete_reports_whether_a_file_was_removed() {
    let f = fixture(GestureConfig::default());
    let mut events = f.handle.subscribe();
    assert!(!f.handle.store().delete("clip").unwrap());

    f.handle.setup(CaptureMode::Video).await.unwrap();
    f.handle.record(Some("clip")).await.unwrap();
    f.handle.stop().await.unwrap();
    loop {
        if let SessionEvent::RecordingFinished { .. } = next_event(&mut events).await {
            break;
        }
    }

    assert!(f.handle.store().exists("clip"));
    assert!(f.handle.store().delete("clip").unwrap());
    assert!(!f.handle.store().exists("clip"));
    assert!(!f.handle.store().delete("clip").unwrap());
}

#[tokio::test]
async fn shutdown_detaches_from_surface() {
    let f = fixture(GestureConfig::default());
    let mut events = f.handle.subscribe();
    f.handle.setup(CaptureMode::Video).await.unwrap();
    assert_eq!(f.surface.layers().len(), 1);

    f.handle.shutdown().await.unwrap();
    assert!(f.surface.layers().is_empty());
    assert!(f.surface.installed_gestures().is_none());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::TornDown)));
}

#[tokio::test]
async fn dropping_the_handle_tears_down() {
    let f = fixture(GestureConfig::default());
    f.handle.setup(CaptureMode::Photo).await.unwrap();
    let surface = f.surface.clone();
    drop(f.handle);

    for _ in 0..100 {
        if surface.layers().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(surface.layers().is_empty());
}
