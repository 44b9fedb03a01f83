//! Take a single photo.

use std::time::Duration;

use camkit_capture_engine::{CaptureMode, SessionEvent};
use camkit_common::config::{AppConfig, BackendKind};

use super::{ensure_applied, open_backend, spawn_session, wait_for};

pub async fn run(config: &AppConfig, kind: BackendKind, save: bool) -> anyhow::Result<()> {
    let backend = open_backend(kind).await?;
    let handle = spawn_session(config, backend.clone());
    let mut events = handle.subscribe();

    ensure_applied("set up the camera", handle.setup(CaptureMode::Photo).await?)?;
    ensure_applied("take a photo", handle.take_photo().await?)?;

    let photo = wait_for(&mut events, Duration::from_secs(15), |event| match event {
        SessionEvent::PhotoReady(photo) => Some(Ok(photo)),
        SessionEvent::PhotoFailed { reason, .. } => Some(Err(reason)),
        _ => None,
    })
    .await?
    .map_err(|reason| anyhow::anyhow!("Photo failed: {reason}"))?;

    println!(
        "Captured {}x{} photo ({} bytes)",
        photo.width(),
        photo.height(),
        photo.encoded.len()
    );

    if save {
        let saved = handle.store().save_photo(photo).await??;
        println!("Saved to {}", saved.display());
    }

    handle.shutdown().await?;
    backend.shutdown().await?;
    Ok(())
}
