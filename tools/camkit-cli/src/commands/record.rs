//! Record a video clip.

use std::time::Duration;

use anyhow::bail;
use camkit_capture_engine::{CaptureMode, SessionEvent};
use camkit_common::config::{AppConfig, BackendKind};
use tokio::sync::broadcast::error::RecvError;

use super::{ensure_applied, open_backend, spawn_session, wait_for};

pub async fn run(
    config: &AppConfig,
    kind: BackendKind,
    name: String,
    seconds: u64,
    save: bool,
) -> anyhow::Result<()> {
    let backend = open_backend(kind).await?;
    let handle = spawn_session(config, backend.clone());
    let mut events = handle.subscribe();

    ensure_applied("set up the camera", handle.setup(CaptureMode::Video).await?)?;
    ensure_applied("start recording", handle.record(Some(name.as_str())).await?)?;

    if seconds > 0 {
        println!("Recording {name:?} for {seconds}s (Ctrl+C to stop early)...");
    } else {
        println!("Recording {name:?}. Press Ctrl+C to stop...");
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Tick { elapsed_secs }) => {
                    println!("  {elapsed_secs}s");
                    if seconds > 0 && elapsed_secs >= seconds {
                        break;
                    }
                }
                Ok(SessionEvent::RecordingFailed { reason, .. }) => {
                    bail!("Recording failed: {reason}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed session events");
                }
                Err(RecvError::Closed) => bail!("Session ended unexpectedly"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    ensure_applied("stop recording", handle.stop().await?)?;

    let (path, duration_secs) = wait_for(&mut events, Duration::from_secs(15), |event| match event {
        SessionEvent::RecordingFinished {
            path,
            duration_secs,
        } => Some(Ok((path, duration_secs))),
        SessionEvent::RecordingFailed { reason, .. } => Some(Err(reason)),
        _ => None,
    })
    .await?
    .map_err(|reason| anyhow::anyhow!("Recording failed: {reason}"))?;

    println!("Recording saved to: {} ({duration_secs:.1}s)", path.display());

    if save {
        let saved = handle.store().save_video(path).await??;
        println!("Copied to {}", saved.display());
    }

    handle.shutdown().await?;
    backend.shutdown().await?;
    Ok(())
}
