//! List capture devices.

use camkit_capture_engine::DeviceRegistry;
use camkit_common::config::BackendKind;

pub async fn run(kind: BackendKind, json: bool) -> anyhow::Result<()> {
    let backend = super::open_backend(kind).await?;
    let registry = DeviceRegistry::new(backend.clone());
    let devices = registry.devices();

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else if devices.is_empty() {
        println!("No capture devices found.");
    } else {
        let default_camera = registry.default_video_device();
        for device in &devices {
            let marker = if default_camera.as_ref() == Some(device) {
                "*"
            } else {
                " "
            };
            println!(
                "{marker} {:<8} {:<10} {:<28} {}",
                format!("{:?}", device.kind),
                format!("{:?}", device.facing),
                device.name,
                device.id
            );
        }
    }

    backend.shutdown().await?;
    Ok(())
}
