//! Check camera access and devices.

use camkit_capture_engine::DeviceRegistry;
use camkit_common::config::BackendKind;
use camkit_device_core::MediaKind;
use camkit_platform_linux::permissions;

pub async fn run(kind: BackendKind) -> anyhow::Result<()> {
    println!("camkit System Check");
    println!("{}", "=".repeat(50));

    let capabilities = permissions::check_capabilities();
    permissions::print_capability_report(&capabilities);
    println!();

    let backend = super::open_backend(kind).await?;
    println!("[OK] Backend: {}", backend.name());
    for media in [MediaKind::Video, MediaKind::Audio] {
        let status = backend.authorization(media);
        let tag = if status.is_authorized() { "[OK]" } else { "[WARN]" };
        println!("{tag} {media:?} authorization: {status:?}");
    }

    let registry = DeviceRegistry::new(backend.clone());
    match registry.default_video_device() {
        Some(camera) => println!("[OK] Default camera: {} ({:?})", camera.name, camera.facing),
        None => println!("[WARN] No camera found"),
    }
    match registry.default_audio_device() {
        Some(mic) => println!("[OK] Default microphone: {}", mic.name),
        None => println!("[WARN] No microphone found; recordings will be video-only"),
    }
    backend.shutdown().await?;

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok || kind == BackendKind::Simulated {
        println!("camkit is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
