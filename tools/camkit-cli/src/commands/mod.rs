pub mod check;
pub mod devices;
pub mod photo;
pub mod record;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use camkit_capture_engine::{
    create_backend, CaptureBackend, MediaStore, OffscreenSurface, Outcome, SessionConfig,
    SessionEvent, SessionHandle,
};
use camkit_common::config::{AppConfig, BackendKind};
use tokio::sync::broadcast::{self, error::RecvError};

pub async fn open_backend(kind: BackendKind) -> anyhow::Result<Arc<dyn CaptureBackend>> {
    Ok(Arc::from(create_backend(kind).await?))
}

/// Start a headless session on `backend`.
pub fn spawn_session(config: &AppConfig, backend: Arc<dyn CaptureBackend>) -> SessionHandle {
    SessionHandle::spawn(
        backend,
        Arc::new(OffscreenSurface::default()),
        MediaStore::from_config(config),
        SessionConfig::from_app_config(config),
    )
}

/// Fail when a command did not apply.
pub fn ensure_applied(what: &str, outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Applied => Ok(()),
        Outcome::Ignored(reason) => bail!("Cannot {what}: {reason}"),
    }
}

/// Wait until `pick` accepts an event, or give up after `limit`.
pub async fn wait_for<T>(
    events: &mut broadcast::Receiver<SessionEvent>,
    limit: Duration,
    mut pick: impl FnMut(SessionEvent) -> Option<T>,
) -> anyhow::Result<T> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| anyhow!("Timed out after {}s waiting for the camera", limit.as_secs()))?;
        match event {
            Ok(event) => {
                if let Some(found) = pick(event) {
                    return Ok(found);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed session events");
            }
            Err(RecvError::Closed) => bail!("Session ended unexpectedly"),
        }
    }
}
